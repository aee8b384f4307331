//! hello-gate token protocol.
//!
//! Maps a trimmed client token to a response for the current session phase:
//! - Handshake: `hello` opens the session, anything else is rejected
//! - Active: `hello`, `negotiate`, `bye`, everything else is unrecognised
//!
//! Pure logic only; the session module owns the socket.

use std::fmt;

pub const MESSAGE_HELLO: &[u8] = b"hello";
pub const MESSAGE_NEGOTIATE: &[u8] = b"negotiate";
pub const MESSAGE_BYE: &[u8] = b"bye";

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the opening `hello`.
    AwaitingHandshake,
    /// Handshake done, accepting commands.
    Active,
    /// `bye` received; the connection is closed next.
    Terminated,
}

/// Response sent back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Hello,
    InvalidStart,
    NegotiateBack,
    Bye,
    NotRecognised,
    ReceiveError,
}

impl Response {
    /// Response text without any terminator.
    pub fn text(self) -> &'static str {
        match self {
            Response::Hello => "hello",
            Response::InvalidStart => "invalid start",
            Response::NegotiateBack => "negotiate back",
            Response::Bye => "bye",
            Response::NotRecognised => "message not recognised",
            Response::ReceiveError => "recieve error",
        }
    }

    /// Exact bytes put on the wire when answering in `phase`.
    ///
    /// Handshake replies and the receive-error reply carry a trailing NUL;
    /// command replies in the active phase do not. Existing clients depend
    /// on these byte counts.
    pub fn as_bytes(self, phase: Phase) -> &'static [u8] {
        match (self, phase) {
            (Response::Hello, Phase::AwaitingHandshake) => b"hello\0",
            (Response::InvalidStart, _) => b"invalid start\0",
            (Response::ReceiveError, _) => b"recieve error\0",
            (Response::Hello, _) => b"hello",
            (Response::NegotiateBack, _) => b"negotiate back",
            (Response::Bye, _) => b"bye",
            (Response::NotRecognised, _) => b"message not recognised",
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// A command token taken from a single receive.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Token<'a>(&'a [u8]);

impl<'a> Token<'a> {
    /// Build a token from raw received bytes.
    ///
    /// Trailing whitespace (space, `\t`, `\n`, `\v`, `\f`, `\r`) is stripped,
    /// then the token ends at the first NUL byte, if any.
    pub fn from_bytes(buf: &'a [u8]) -> Self {
        let mut len = buf.len();
        while len > 0 && is_space(buf[len - 1]) {
            len -= 1;
        }
        let trimmed = &buf[..len];
        let end = trimmed.iter().position(|&b| b == 0).unwrap_or(len);
        Token(&trimmed[..end])
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }
}

impl fmt::Debug for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.0))
    }
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// Outcome of applying one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub response: Response,
    pub next: Phase,
}

impl Phase {
    /// Apply a token received in this phase.
    pub fn respond(self, token: Token<'_>) -> Transition {
        let token = token.as_bytes();
        let (response, next) = match self {
            Phase::AwaitingHandshake => {
                if token == MESSAGE_HELLO {
                    (Response::Hello, Phase::Active)
                } else {
                    (Response::InvalidStart, Phase::AwaitingHandshake)
                }
            }
            Phase::Active => match token {
                MESSAGE_HELLO => (Response::Hello, Phase::Active),
                MESSAGE_BYE => (Response::Bye, Phase::Terminated),
                MESSAGE_NEGOTIATE => (Response::NegotiateBack, Phase::Active),
                _ => (Response::NotRecognised, Phase::Active),
            },
            // Nothing is read after termination; stay put if asked anyway.
            Phase::Terminated => (Response::NotRecognised, Phase::Terminated),
        };
        Transition { response, next }
    }
}
