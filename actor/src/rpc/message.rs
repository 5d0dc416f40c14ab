// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Wire messages
//!
//! Every message exchanged between nodes is an [`Envelope`]: typed metadata plus an opaque body.
//! The metadata types form a closed set ([`Metadata`]); each one declares the name that
//! identifies it on the wire through [`WireMessage`].
//!

use crate::Error;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Error codes carried by [`RpcResponse`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcErrorCode {
    Ok = 0,
    UnknownError = -1,
    TimeoutError = -1001,
    MethodNotFound = -1002,
    PositionNotFound = -1003,
    PositionChanged = -1004,
}

impl RpcErrorCode {
    /// Wire value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Parses a wire value. Unknown values map to `UnknownError`.
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => RpcErrorCode::Ok,
            -1001 => RpcErrorCode::TimeoutError,
            -1002 => RpcErrorCode::MethodNotFound,
            -1003 => RpcErrorCode::PositionNotFound,
            -1004 => RpcErrorCode::PositionChanged,
            _ => RpcErrorCode::UnknownError,
        }
    }
}

/// A message type that can travel as envelope metadata.
pub trait WireMessage:
    Serialize + DeserializeOwned + Into<Metadata> + Send + 'static
{
    /// Registered type name, at most 255 bytes.
    const NAME: &'static str;
}

/// Remote method call. Arguments travel in the envelope body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Actor type (contract) name.
    pub server_name: String,
    pub method_name: String,
    pub actor_id: String,
    /// Call chain token of the caller, 0 if none.
    pub reentrant_id: u64,
    pub request_id: u64,
    /// Server the caller believes owns the actor. Empty disables the position check.
    pub server_id: String,
}

/// Answer to an [`RpcRequest`]. On success the body carries the serialized return value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub request_id: u64,
    pub error_code: i32,
    pub error_str: String,
}

impl RpcResponse {
    /// Successful response.
    pub fn ok(request_id: u64) -> Self {
        Self {
            request_id,
            error_code: RpcErrorCode::Ok.as_i32(),
            error_str: String::new(),
        }
    }

    /// Error response built from a runtime error.
    pub fn error(request_id: u64, error: &Error) -> Self {
        Self {
            request_id,
            error_code: error.code().as_i32(),
            error_str: error.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_code == RpcErrorCode::Ok.as_i32()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeartBeat {
    pub now_sec: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeartBeat {
    pub now_sec: u64,
}

/// A gateway session now serves the actor. Pushes go to this session from now on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyNewActorSession {
    pub actor_type: String,
    pub actor_id: String,
    pub session_id: u64,
}

/// The gateway session of an actor is gone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyActorSessionAborted {
    pub actor_type: String,
    pub actor_id: String,
    pub session_id: u64,
}

/// Push from an actor to its gateway session. The body is application defined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyNewActorMessage {
    pub actor_type: String,
    pub actor_id: String,
    pub session_id: u64,
}

/// Envelope metadata: the closed set of wire messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metadata {
    Request(RpcRequest),
    Response(RpcResponse),
    RequestHeartBeat(RequestHeartBeat),
    ResponseHeartBeat(ResponseHeartBeat),
    NotifyNewActorSession(NotifyNewActorSession),
    NotifyActorSessionAborted(NotifyActorSessionAborted),
    NotifyNewActorMessage(NotifyNewActorMessage),
}

macro_rules! wire_messages {
    ($($variant:ident => $message:ty),* $(,)?) => {
        $(
            impl WireMessage for $message {
                const NAME: &'static str = stringify!($message);
            }

            impl From<$message> for Metadata {
                fn from(message: $message) -> Self {
                    Metadata::$variant(message)
                }
            }
        )*

        impl Metadata {
            /// Registered name of the message.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Metadata::$variant(_) => <$message as WireMessage>::NAME,)*
                }
            }

            /// Serialized fields of the message, without its name.
            pub(crate) fn encode_fields(&self) -> Result<Vec<u8>, Error> {
                match self {
                    $(Metadata::$variant(message) => bincode::serialize(message),)*
                }
                .map_err(|e| Error::Codec(format!("{}: {}", self.name(), e)))
            }
        }
    };
}

wire_messages! {
    Request => RpcRequest,
    Response => RpcResponse,
    RequestHeartBeat => RequestHeartBeat,
    ResponseHeartBeat => ResponseHeartBeat,
    NotifyNewActorSession => NotifyNewActorSession,
    NotifyActorSessionAborted => NotifyActorSessionAborted,
    NotifyNewActorMessage => NotifyNewActorMessage,
}

/// Framed unit exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub meta: Metadata,
    pub body: Vec<u8>,
}

impl Envelope {
    pub fn new(meta: impl Into<Metadata>, body: Vec<u8>) -> Self {
        Self {
            meta: meta.into(),
            body,
        }
    }

    /// Envelope with an empty body.
    pub fn meta(meta: impl Into<Metadata>) -> Self {
        Self::new(meta, Vec::new())
    }
}
