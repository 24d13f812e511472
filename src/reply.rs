//! AMQP 0-9-1 reply codes
//!
//! This module provides the reply-code system used to classify and describe
//! protocol exceptions: every `Channel.Close`/`Connection.Close` carries a
//! numeric reply code, and that code alone determines whether the failure
//! is scoped to the channel ("soft") or tears down the whole connection
//! ("hard").

use serde::{Deserialize, Serialize};

/// A named AMQP 0-9-1 reply code, soft or hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplyCode {
    /// code 0 - not a real server reply; synthesized when the transport is
    /// lost before any close handshake occurs.
    ConnectionAborted,
    ContentTooLarge,
    NoConsumers,
    ConnectionForced,
    InvalidPath,
    AccessRefused,
    NotFound,
    ResourceLocked,
    PreconditionFailed,
    FrameError,
    SyntaxError,
    CommandInvalid,
    ChannelError,
    UnexpectedFrame,
    ResourceError,
    NotAllowed,
    NotImplemented,
    InternalError,
}

impl ReplyCode {
    /// Look up the reply for a numeric code as carried on the wire in
    /// `Connection.Close`/`Channel.Close`'s `reply_code` field.
    pub fn from_code(code: u16) -> Option<Self> {
        use ReplyCode::*;
        Some(match code {
            0 => ConnectionAborted,
            311 => ContentTooLarge,
            313 => NoConsumers,
            320 => ConnectionForced,
            402 => InvalidPath,
            403 => AccessRefused,
            404 => NotFound,
            405 => ResourceLocked,
            406 => PreconditionFailed,
            501 => FrameError,
            502 => SyntaxError,
            503 => CommandInvalid,
            504 => ChannelError,
            505 => UnexpectedFrame,
            506 => ResourceError,
            530 => NotAllowed,
            540 => NotImplemented,
            541 => InternalError,
            _ => return None,
        })
    }

    /// The numeric code as it appears on the wire.
    pub fn code_num(&self) -> u16 {
        use ReplyCode::*;
        match self {
            ConnectionAborted => 0,
            ContentTooLarge => 311,
            NoConsumers => 313,
            ConnectionForced => 320,
            InvalidPath => 402,
            AccessRefused => 403,
            NotFound => 404,
            ResourceLocked => 405,
            PreconditionFailed => 406,
            FrameError => 501,
            SyntaxError => 502,
            CommandInvalid => 503,
            ChannelError => 504,
            UnexpectedFrame => 505,
            ResourceError => 506,
            NotAllowed => 530,
            NotImplemented => 540,
            InternalError => 541,
        }
    }

    /// `true` for channel-scoped errors, `false` for connection-scoped
    /// ("hard") errors. `ConnectionAborted` (code 0) is hard: there is no
    /// connection left to keep any channel alive on.
    pub fn is_soft(&self) -> bool {
        use ReplyCode::*;
        matches!(
            self,
            ContentTooLarge | NoConsumers | AccessRefused | NotFound | ResourceLocked | PreconditionFailed
        )
    }

    pub fn is_hard(&self) -> bool {
        !self.is_soft()
    }

    pub fn as_str(&self) -> &'static str {
        use ReplyCode::*;
        match self {
            ConnectionAborted => "connection-aborted",
            ContentTooLarge => "content-too-large",
            NoConsumers => "no-consumers",
            ConnectionForced => "connection-forced",
            InvalidPath => "invalid-path",
            AccessRefused => "access-refused",
            NotFound => "not-found",
            ResourceLocked => "resource-locked",
            PreconditionFailed => "precondition-failed",
            FrameError => "frame-error",
            SyntaxError => "syntax-error",
            CommandInvalid => "command-invalid",
            ChannelError => "channel-error",
            UnexpectedFrame => "unexpected-frame",
            ResourceError => "resource-error",
            NotAllowed => "not-allowed",
            NotImplemented => "not-implemented",
            InternalError => "internal-error",
        }
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code_num())
    }
}

/// A fully-formed protocol exception, as carried by a `Close` method or
/// synthesized locally (framing errors, transport loss).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmqpException {
    pub reply_code: ReplyCode,
    pub reply_text: String,
    pub class_id: u16,
    pub method_id: u16,
}

impl AmqpException {
    pub fn new(reply_code: ReplyCode, reply_text: impl Into<String>) -> Self {
        AmqpException {
            reply_code,
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
        }
    }

    pub fn with_method(mut self, class_id: u16, method_id: u16) -> Self {
        self.class_id = class_id;
        self.method_id = method_id;
        self
    }

    /// The exception synthesized when the host reports transport loss with
    /// no preceding close handshake.
    pub fn connection_aborted() -> Self {
        AmqpException::new(ReplyCode::ConnectionAborted, "connection aborted")
    }
}

impl std::fmt::Display for AmqpException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reply_code, self.reply_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_hard_classification_matches_spec() {
        for code in [311u16, 313, 403, 404, 405, 406] {
            assert!(ReplyCode::from_code(code).unwrap().is_soft(), "{code} should be soft");
        }
        for code in [320u16, 402, 501, 502, 503, 504, 505, 506, 530, 540, 541] {
            assert!(ReplyCode::from_code(code).unwrap().is_hard(), "{code} should be hard");
        }
    }

    #[test]
    fn connection_aborted_is_hard_code_zero() {
        let r = ReplyCode::ConnectionAborted;
        assert_eq!(r.code_num(), 0);
        assert!(r.is_hard());
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(ReplyCode::from_code(999), None);
    }
}
