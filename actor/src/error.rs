// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! Every fallible operation of the runtime returns this error. Errors that cross the wire are
//! carried as an [`RpcErrorCode`] plus a message, see [`Error::code`] and
//! [`Error::from_response`].
//!

use crate::rpc::RpcErrorCode;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor runtime.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// An error occurred while sending a message to an actor.
    #[error("An error occurred while sending a message to actor: {0}.")]
    Send(String),
    /// No implementation is registered for the actor type.
    #[error("No implementation registered for actor type {0}.")]
    ImplementationNotFound(String),
    /// The target actor type has no such method.
    #[error("Method {method} not found on actor {actor}.")]
    MethodNotFound { actor: String, method: String },
    /// No node is able to host the actor.
    #[error("Position not found for actor {0}.")]
    PositionNotFound(String),
    /// The node that received the request no longer owns the actor.
    #[error("Position changed for actor {0}.")]
    PositionChanged(String),
    /// The owning node has no live session.
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),
    /// No response arrived before the call deadline.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// A remote node answered with an error code.
    #[error("Remote error {code}: {message}")]
    Rpc { code: i32, message: String },
    /// Malformed frame or unknown message type. Fatal to the connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// A message could not be encoded.
    #[error("Codec error: {0}")]
    Codec(String),
    /// Arguments or return values could not be serialized.
    #[error("Payload error: {0}")]
    Payload(String),
    /// Byte stream failure below the codec.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Claim store error.
    #[error("Store error: {0}")]
    Store(String),
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Invalid sequence seed.
    #[error("Sequence error: {0}")]
    Sequence(String),
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// Wire code reported to remote callers for this error.
    pub fn code(&self) -> RpcErrorCode {
        match self {
            Error::MethodNotFound { .. } => RpcErrorCode::MethodNotFound,
            Error::PositionNotFound(_) => RpcErrorCode::PositionNotFound,
            Error::PositionChanged(_) => RpcErrorCode::PositionChanged,
            Error::Timeout(_) => RpcErrorCode::TimeoutError,
            Error::Rpc { code, .. } => RpcErrorCode::from_i32(*code),
            _ => RpcErrorCode::UnknownError,
        }
    }

    /// Rebuilds an error from a non-OK response.
    ///
    /// Placement and timeout codes map back to their typed variants so callers (and the proxy
    /// retry loop) can match on them; everything else becomes [`Error::Rpc`].
    pub fn from_response(code: i32, message: &str) -> Self {
        match RpcErrorCode::from_i32(code) {
            RpcErrorCode::PositionChanged => {
                Error::PositionChanged(message.to_owned())
            }
            RpcErrorCode::PositionNotFound => {
                Error::PositionNotFound(message.to_owned())
            }
            RpcErrorCode::TimeoutError => Error::Timeout(message.to_owned()),
            _ => Error::Rpc {
                code,
                message: message.to_owned(),
            },
        }
    }
}

impl From<store::Error> for Error {
    fn from(error: store::Error) -> Self {
        Error::Store(error.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Transport(error.to_string())
    }
}
