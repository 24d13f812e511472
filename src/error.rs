//! AMQP 0-9-1 error handling
//!
//! This module defines the error currency for the whole crate. It follows
//! the same shape for every failure mode the protocol engine can hit:
//! malformed wire data, illegal state transitions, and exceptions raised by
//! the broker itself.
//!
//! # Examples
//!
//! ```rust
//! use amqp091_proto::error::{AmqpError, AmqpResult};
//!
//! fn handle(result: AmqpResult<()>) {
//!     match result {
//!         Ok(()) => {}
//!         Err(AmqpError::InvalidState(msg)) => eprintln!("invalid state: {msg}"),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

use thiserror::Error;
use crate::reply::AmqpException;

/// Errors the protocol engine can produce.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmqpError {
    #[error("frame decode error: {0}")]
    Framing(String),

    #[error("value out of domain range or malformed: {0}")]
    Syntax(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("resource error: {0}")]
    Resource(String),

    /// A reply (exception) received from, or synthesized on behalf of, the
    /// broker: a `Connection.Close`/`Channel.Close`, or a locally detected
    /// framing/transport failure mapped onto the same taxonomy.
    #[error("{0}")]
    Amqp(AmqpException),
}

/// Result type for AMQP operations
pub type AmqpResult<T> = Result<T, AmqpError>;

impl AmqpError {
    pub fn framing(msg: impl Into<String>) -> Self {
        AmqpError::Framing(msg.into())
    }

    pub fn syntax(msg: impl Into<String>) -> Self {
        AmqpError::Syntax(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AmqpError::InvalidState(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        AmqpError::NotImplemented(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        AmqpError::Resource(msg.into())
    }

    pub fn amqp(exception: AmqpException) -> Self {
        AmqpError::Amqp(exception)
    }

    /// The exception this error carries, if it wraps one.
    pub fn exception(&self) -> Option<&AmqpException> {
        match self {
            AmqpError::Amqp(e) => Some(e),
            _ => None,
        }
    }

    /// A short machine-stable error code, used in log lines and diagnostics.
    pub fn error_code(&self) -> &str {
        match self {
            AmqpError::Framing(_) => "framing-error",
            AmqpError::Syntax(_) => "syntax-error",
            AmqpError::InvalidState(_) => "invalid-state",
            AmqpError::NotImplemented(_) => "not-implemented",
            AmqpError::Resource(_) => "resource-error",
            AmqpError::Amqp(e) => e.reply_code.as_str(),
        }
    }

    /// The reply code as a number, defaulting to the generic framing code
    /// (501) for purely local errors that never reached the wire as a
    /// numbered reply.
    pub fn error_code_num(&self) -> u16 {
        match self {
            AmqpError::Amqp(e) => e.reply_code.code_num(),
            AmqpError::Framing(_) => 501,
            AmqpError::Syntax(_) => 502,
            AmqpError::NotImplemented(_) => 540,
            _ => 541,
        }
    }
}

impl From<AmqpException> for AmqpError {
    fn from(e: AmqpException) -> Self {
        AmqpError::Amqp(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::ReplyCode;

    #[test]
    fn amqp_error_carries_reply_code() {
        let err = AmqpError::amqp(AmqpException::new(ReplyCode::PreconditionFailed, "precondition"));
        assert_eq!(err.error_code_num(), 406);
        assert_eq!(err.error_code(), "precondition-failed");
    }

    #[test]
    fn local_errors_default_codes() {
        assert_eq!(AmqpError::framing("bad").error_code_num(), 501);
        assert_eq!(AmqpError::syntax("bad").error_code_num(), 502);
        assert_eq!(AmqpError::not_implemented("x").error_code_num(), 540);
    }
}
