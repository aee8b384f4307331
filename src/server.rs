//! TCP server for hello-gate connections.
//!
//! Binds the listening socket, accepts connections and spawns one
//! session task per connection. Never looks at protocol content.

use crate::config::Config;
use crate::session::{self, SessionConfig};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{self, TcpListener};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Address could not be resolved or bound.
    #[error("failure bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Bound socket could not be put into listening mode.
    #[error("failure listen {address}: {source}")]
    Listen {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    session: SessionConfig,
}

impl Server {
    /// Bind and listen on the configured address with the configured backlog.
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let address = config.listen_address();
        let bind_err = |source| ServerError::Bind {
            address: address.clone(),
            source,
        };

        let addr = resolve(&address).await.map_err(bind_err)?;
        let socket = create_socket(addr).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;

        let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
        let listen_err = |source| ServerError::Listen {
            address: addr,
            source,
        };
        socket.listen(backlog).map_err(listen_err)?;

        let listener = TcpListener::from_std(socket.into()).map_err(listen_err)?;

        Ok(Server {
            listener,
            session: SessionConfig::from(config),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one session task each.
    pub async fn run(self) {
        match self.local_addr() {
            Ok(addr) => info!(address = %addr, "Server listening"),
            Err(e) => warn!(error = %e, "Server listening on unknown address"),
        }

        loop {
            debug!("Waiting for new connections");
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New connection");

                    let span = info_span!("session", peer = %peer);
                    tokio::spawn(session::run(stream, self.session).instrument(span));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Bind, then serve until the process exits.
///
/// Only returns on a startup failure.
pub async fn serve(config: &Config) -> Result<(), ServerError> {
    Server::bind(config).await?.run().await;
    Ok(())
}

async fn resolve(address: &str) -> io::Result<SocketAddr> {
    net::lookup_host(address).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no addresses resolved for {address}"),
        )
    })
}

fn create_socket(addr: SocketAddr) -> io::Result<socket2::Socket> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    Ok(socket)
}
