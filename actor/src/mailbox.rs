// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Items an actor cell drains, in arrival order.

use crate::{actor::Actor, rpc::RpcRequest, session::SessionId, timer::TimerId};

use tokio::sync::mpsc;

/// Where the response of a request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTo {
    /// Back through the session the request arrived on.
    Session(SessionId),
    /// Straight to the pending call of an in-process caller.
    Local,
}

/// A request waiting for its actor.
#[derive(Debug)]
pub struct InboundRequest {
    pub reply_to: ReplyTo,
    pub request: RpcRequest,
    pub body: Vec<u8>,
}

/// One unit of work for an actor cell.
pub enum MailboxItem<A: Actor> {
    /// Custom local message.
    Message(A::Message),
    /// Remote (or in-process) method call.
    Request(InboundRequest),
    /// Timer fire.
    Timer(TimerId),
    /// Opaque message a gateway forwarded for its client.
    Custom { session: SessionId, body: Vec<u8> },
    /// A gateway session now serves the actor.
    SessionBound(SessionId),
    /// The gateway session is gone.
    SessionAborted(SessionId),
    /// Deactivation sentinel enqueued by the GC sweep.
    Collect,
}

pub(crate) type MailboxSender<A> = mpsc::UnboundedSender<MailboxItem<A>>;
pub(crate) type MailboxReceiver<A> = mpsc::UnboundedReceiver<MailboxItem<A>>;
pub(crate) type WeakMailboxSender<A> = mpsc::WeakUnboundedSender<MailboxItem<A>>;

/// Ordered queue of an actor cell.
pub(crate) fn mailbox<A: Actor>() -> (MailboxSender<A>, MailboxReceiver<A>) {
    mpsc::unbounded_channel()
}

/// Channel of the reentrant requests that bypass the queue.
pub(crate) fn priority_channel() -> (
    mpsc::UnboundedSender<InboundRequest>,
    mpsc::UnboundedReceiver<InboundRequest>,
) {
    mpsc::unbounded_channel()
}
