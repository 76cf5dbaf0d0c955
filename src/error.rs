//! Error types and error handling strategy.
//!
//! Error handling follows the crate's failure taxonomy:
//!
//! - **Halt** is cooperative and expected; it is an [`Outcome`]
//!   (crate::types::Outcome) variant, never an error.
//! - **Timeout**, **retries-exceeded**, and other fatal conditions surface as
//!   hosting-unit failures through `Outcome::Failed`, not through `Result`.
//! - `Result`-level errors are reserved for the interpreter's own edges:
//!   mailbox pressure, routing to unknown addresses, configuration problems,
//!   and the step-limit safety valve.

use core::fmt;

use crate::config::ConfigError;
use crate::types::RawAddr;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Mailboxes ===
    /// The target mailbox is at capacity; the message was dropped.
    MailboxFull,
    /// The target process has reached a terminal state.
    MailboxClosed,

    // === Routing ===
    /// No process exists at the target address.
    UnknownAddress,

    // === Interpreter ===
    /// The configured step limit was reached before quiescence.
    StepLimitExceeded,

    // === Configuration ===
    /// Invalid runtime configuration.
    Config,
}

impl ErrorKind {
    /// Returns a static description of the error kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MailboxFull => "mailbox full",
            Self::MailboxClosed => "mailbox closed",
            Self::UnknownAddress => "unknown address",
            Self::StepLimitExceeded => "step limit exceeded",
            Self::Config => "invalid configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An interpreter-edge error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    /// The address involved, when the error concerns routing or delivery.
    addr: Option<RawAddr>,
    detail: Option<&'static str>,
}

impl Error {
    /// Creates an error of the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            addr: None,
            detail: None,
        }
    }

    /// Attaches the address the error concerns.
    #[must_use]
    pub const fn at(mut self, addr: RawAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// Attaches a static detail message.
    #[must_use]
    pub const fn with_detail(mut self, detail: &'static str) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the address involved, if any.
    #[must_use]
    pub const fn addr(&self) -> Option<RawAddr> {
        self.addr
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(addr) = self.addr {
            write!(f, " at {addr}")?;
        }
        if let Some(detail) = self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(_: ConfigError) -> Self {
        Self::new(ErrorKind::Config)
    }
}

/// Convenience alias used throughout the interpreter.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActorId, FiberId};

    #[test]
    fn display_includes_address_and_detail() {
        let err = Error::new(ErrorKind::MailboxFull)
            .at(RawAddr::new(ActorId::from_index(2), FiberId::ROOT))
            .with_detail("capacity 4");
        let text = err.to_string();
        assert!(text.contains("mailbox full"));
        assert!(text.contains("U2/P0"));
        assert!(text.contains("capacity 4"));
    }

    #[test]
    fn kind_accessor() {
        assert_eq!(
            Error::new(ErrorKind::UnknownAddress).kind(),
            ErrorKind::UnknownAddress
        );
    }
}
