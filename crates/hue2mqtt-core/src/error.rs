// ── Core error types ──
//
// The taxonomy mirrors how failures are handled, not where they occur:
// connection errors feed supervised reconnect loops, addressing and
// translation errors skip the offending device or message, and only
// configuration errors are allowed to stop the process -- before any
// connection is attempted.

use thiserror::Error;

use crate::model::Category;

/// A device could not be mapped to a topic identity.
///
/// The device's publications are skipped; the bridge continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("device {category}/{id} has no usable identity under topic scheme '{scheme}'")]
pub struct AddressingError {
    pub category: Category,
    pub id: String,
    pub scheme: &'static str,
}

/// An inbound topic path did not match the control-topic shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicParseError {
    #[error("topic '{topic}' is outside the configured prefix")]
    WrongPrefix { topic: String },

    #[error("topic '{topic}' has {got} segments, expected {expected}")]
    SegmentCount {
        topic: String,
        got: usize,
        expected: usize,
    },

    #[error("unknown device category '{segment}'")]
    UnknownCategory { segment: String },

    #[error("topic '{topic}' is not a control topic (missing '/set' suffix)")]
    NotAControlTopic { topic: String },
}

/// An inbound control message could not be turned into a hub command.
///
/// The message is dropped and logged; no command is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error(transparent)]
    Topic(#[from] TopicParseError),

    #[error("{category} devices are read-only")]
    Unwritable { category: Category },

    #[error("unusable payload: {reason}")]
    BadPayload { reason: String },

    #[error("no {category} known as '{identity}'")]
    UnknownDevice {
        category: Category,
        identity: String,
    },
}

/// Top-level bridge error.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Hub transport failure (handshake, snapshot, command, events).
    #[error(transparent)]
    Api(#[from] hue2mqtt_api::ApiError),

    /// Startup-fatal configuration problem.
    #[error("Configuration error: {message}")]
    Config { message: String },
}
