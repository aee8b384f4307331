//! Per-connection session state machine.
//!
//! A session reads one chunk at a time (no accumulation across reads),
//! turns it into a token, answers it and advances the phase until the
//! client says `bye`. Receive errors are reported to the client and the
//! session carries on in the same phase.

use crate::config::Config;
use crate::protocol::{Phase, Response, Token};
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Settings shared by every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound on bytes taken from a single receive.
    pub buffer_size: usize,
    /// Consecutive receive errors before the session gives up.
    /// `None` retries forever.
    pub max_receive_errors: Option<u32>,
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            buffer_size: config.buffer_size,
            max_receive_errors: config.max_receive_errors,
        }
    }
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Close {
    /// Client said `bye`.
    Bye,
    /// Peer shut down its sending side.
    PeerClosed,
    /// Receive-error limit reached.
    ReceiveErrors,
}

struct Session<S> {
    stream: S,
    buffer: BytesMut,
    phase: Phase,
    receive_errors: u32,
    config: SessionConfig,
}

/// Drive one connection to completion and close it.
///
/// Never fails. Receive errors are answered and the session carries on;
/// a failed send or end of stream ends it, and both are only logged.
pub async fn run<S>(stream: S, config: SessionConfig)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session {
        stream,
        buffer: BytesMut::zeroed(config.buffer_size),
        phase: Phase::AwaitingHandshake,
        receive_errors: 0,
        config,
    };

    match session.drive().await {
        Ok(reason) => debug!(?reason, "Session closed"),
        Err(e) => debug!(error = %e, phase = ?session.phase, "Session aborted"),
    }

    if let Err(e) = session.stream.shutdown().await {
        trace!(error = %e, "Shutdown failed");
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn drive(&mut self) -> io::Result<Close> {
        while self.phase != Phase::Terminated {
            let n = match self.stream.read(&mut self.buffer[..]).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, phase = ?self.phase, "Receive error");
                    self.send(Response::ReceiveError).await?;
                    self.receive_errors += 1;
                    if let Some(limit) = self.config.max_receive_errors {
                        if self.receive_errors >= limit {
                            warn!(limit, "Too many receive errors, closing session");
                            return Ok(Close::ReceiveErrors);
                        }
                    }
                    continue;
                }
            };
            self.receive_errors = 0;

            let token = Token::from_bytes(&self.buffer[..n]);
            let transition = self.phase.respond(token);
            trace!(?token, response = %transition.response, "Token");

            self.send(transition.response).await?;

            if self.phase == Phase::AwaitingHandshake && transition.next == Phase::Active {
                debug!("Handshake complete");
            }
            self.phase = transition.next;

            if n == 0 {
                // EOF: the empty token has been answered, nothing more can arrive.
                return Ok(Close::PeerClosed);
            }
        }

        Ok(Close::Bye)
    }

    async fn send(&mut self, response: Response) -> io::Result<()> {
        self.stream.write_all(response.as_bytes(self.phase)).await
    }
}
