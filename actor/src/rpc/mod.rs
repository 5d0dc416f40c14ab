// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Remote procedure calls
//!
//! Wire messages, the envelope codec, payload serialization, and the two ends of a call: the
//! [`Dispatcher`] that routes inbound envelopes and the [`ActorProxy`] that sends typed
//! requests and waits for their responses.
//!

mod codec;
mod dispatcher;
mod message;
pub mod payload;
mod pending;
mod proxy;

pub use codec::{DEFAULT_MAGIC, DEFAULT_MAX_FRAME_SIZE, EnvelopeCodec};
pub use dispatcher::Dispatcher;
pub use message::{
    Envelope, Metadata, NotifyActorSessionAborted, NotifyNewActorMessage,
    NotifyNewActorSession, RequestHeartBeat, ResponseHeartBeat, RpcErrorCode,
    RpcRequest, RpcResponse, WireMessage,
};
pub use payload::DEFAULT_COMPRESS_THRESHOLD;
pub use pending::{PendingCalls, Reply};
pub use proxy::ActorProxy;
