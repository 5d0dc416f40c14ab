// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` trait and the `ActorContext` type. The `Actor` trait
//! is the main trait that virtual actors must implement. The `ActorContext` is the per-actor
//! execution state: the ordered queue, the reentrant priority channel, the loop and reentrant
//! tokens, the timers and the handle to the node.
//!
//! Virtual actors are never spawned explicitly. A node builds one the first time a request,
//! message or session notification references it, and deactivates it once it stays idle for
//! longer than [`Actor::gc_timeout`].
//!

use crate::{
    ActorReference, Error, NodeRef,
    mailbox::{
        InboundRequest, MailboxItem, MailboxReceiver, MailboxSender, mailbox,
        priority_channel,
    },
    rpc::{ActorProxy, Envelope, NotifyNewActorMessage},
    session::SessionId,
    timer::{TimerCallback, TimerId, TimerManager},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{sync::mpsc, time::Instant};
use tracing::debug;

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Idle time after which an actor is deactivated, unless the actor overrides it.
pub const DEFAULT_GC_TIMEOUT: Duration = Duration::from_secs(1800);

/// Name of an actor type, as it travels in `RpcRequest::server_name`.
///
/// Proxies are typed by contract, so a caller only needs the contract (not the actor
/// implementation) to reach an actor hosted on another node.
pub trait Contract: Send + Sync + 'static {
    const NAME: &'static str;
}

/// Custom local message of an actor.
pub trait Message: Send + 'static {}

impl Message for () {}

/// Virtual actor.
///
/// Handlers take `&self`: while a main queue item is suspended on a nested call, reentrant
/// requests of the same call chain run on the same instance. Mutable state therefore lives
/// behind interior mutability.
///
/// # Examples
///
/// ```ignore
/// use actor::{Actor, ActorContext, Contract, Error};
/// use async_trait::async_trait;
///
/// pub struct EchoContract;
///
/// impl Contract for EchoContract {
///     const NAME: &'static str = "Echo";
/// }
///
/// pub struct Echo {
///     id: String,
/// }
///
/// #[async_trait]
/// impl Actor for Echo {
///     type Contract = EchoContract;
///     type Message = ();
///
///     fn create(actor_id: &str) -> Self {
///         Echo { id: actor_id.to_owned() }
///     }
/// }
/// ```
#[async_trait]
pub trait Actor: Send + Sync + Sized + 'static {
    /// Contract this actor implements.
    type Contract: Contract;

    /// Custom local message, delivered with [`NodeRef::tell`].
    type Message: Message;

    /// Builds the actor for an id. Called on first reference.
    fn create(actor_id: &str) -> Self;

    /// Idle time before deactivation.
    fn gc_timeout() -> Duration {
        DEFAULT_GC_TIMEOUT
    }

    /// Load of one active instance, summed into the node weight.
    fn weight() -> u64 {
        1
    }

    /// Runs before the first item is handled. A failure is logged and the actor keeps going.
    async fn on_activate(&self, _ctx: &ActorContext<Self>) -> Result<(), Error> {
        Ok(())
    }

    /// Runs once when the actor is collected, even if activation failed.
    async fn on_deactivate(&self, _ctx: &ActorContext<Self>) -> Result<(), Error> {
        Ok(())
    }

    /// Handles a custom local message.
    async fn handle_message(
        &self,
        _msg: Self::Message,
        _ctx: &ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Handles a message a gateway session forwarded for its client. The runtime does not
    /// look into `body`.
    async fn on_custom_message(
        &self,
        _session: SessionId,
        _body: Vec<u8>,
        _ctx: &ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Execution state of one actor cell.
pub struct ActorContext<A: Actor> {
    reference: ActorReference,
    node: NodeRef,
    /// Id of the running drain task, 0 when idle.
    loop_id: AtomicU64,
    /// Call chain of the item being handled, 0 when none.
    reentrant_token: AtomicU64,
    last_activity: Mutex<Instant>,
    sender: MailboxSender<A>,
    receiver: tokio::sync::Mutex<MailboxReceiver<A>>,
    priority_sender: mpsc::UnboundedSender<InboundRequest>,
    priority_receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundRequest>>,
    timers: TimerManager<A>,
    session: Mutex<Option<SessionId>>,
}

impl<A: Actor> ActorContext<A> {
    pub(crate) fn new(node: NodeRef, reference: ActorReference) -> Self {
        let (sender, receiver) = mailbox::<A>();
        let (priority_sender, priority_receiver) = priority_channel();
        let timers = TimerManager::new(sender.downgrade());
        Self {
            reference,
            node,
            loop_id: AtomicU64::new(0),
            reentrant_token: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            priority_sender,
            priority_receiver: tokio::sync::Mutex::new(priority_receiver),
            timers,
            session: Mutex::new(None),
        }
    }

    pub fn reference(&self) -> &ActorReference {
        &self.reference
    }

    pub fn actor_id(&self) -> &str {
        self.reference.actor_id()
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Proxy to another actor that carries the call chain of the item being handled, so calls
    /// back into this actor bypass its queue instead of deadlocking on it.
    pub fn proxy<C: Contract>(&self, actor_id: &str) -> ActorProxy<C> {
        ActorProxy::new(self.node.clone(), actor_id)
            .with_reentrant_id(self.reentrant_token())
    }

    /// Registers a timer.
    ///
    /// The first fire happens after `delay`, the next ones every `interval`. With
    /// `repetition == 0` the timer fires until unregistered; a zero `interval` makes it fire
    /// once. Callbacks run on the actor loop, in order with the rest of its queue.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// ctx.register_timer(
    ///     Duration::from_secs(1),
    ///     Duration::from_secs(5),
    ///     0,
    ///     Arc::new(|actor: Arc<Room>, _ctx: Arc<ActorContext<Room>>| -> BoxFuture<'static, ()> {
    ///         Box::pin(async move { actor.tick() })
    ///     }),
    /// );
    /// ```
    pub fn register_timer(
        &self,
        delay: Duration,
        interval: Duration,
        repetition: u64,
        callback: TimerCallback<A>,
    ) -> TimerId {
        self.timers.register(delay, interval, repetition, callback)
    }

    pub fn unregister_timer(&self, timer: TimerId) -> bool {
        self.timers.unregister(timer)
    }

    /// Number of registered timers.
    pub fn timers(&self) -> usize {
        self.timers.len()
    }

    /// Gateway session bound to this actor.
    pub fn session(&self) -> Option<SessionId> {
        *self.session.lock()
    }

    /// Pushes a message to the bound gateway session.
    pub async fn push(&self, body: Vec<u8>) -> Result<(), Error> {
        let session_id = self.session().ok_or_else(|| {
            Error::SessionUnavailable(format!("no session bound to {}", self.reference))
        })?;
        let session = self.node.sessions().get(session_id).ok_or_else(|| {
            Error::SessionUnavailable(format!(
                "session {} of {} is closed",
                session_id, self.reference
            ))
        })?;
        let meta = NotifyNewActorMessage {
            actor_type: self.reference.actor_type().to_owned(),
            actor_id: self.reference.actor_id().to_owned(),
            session_id,
        };
        session.send(Envelope::new(meta, body)).await
    }

    /// Call chain of the item being handled, 0 when idle.
    pub fn reentrant_token(&self) -> u64 {
        self.reentrant_token.load(Ordering::Acquire)
    }

    pub(crate) fn set_reentrant_token(&self, token: u64) {
        self.reentrant_token.store(token, Ordering::Release);
    }

    pub(crate) fn loop_id(&self) -> u64 {
        self.loop_id.load(Ordering::Acquire)
    }

    /// Installs a loop id if no loop runs.
    pub(crate) fn start_loop(&self, id: u64) -> bool {
        self.loop_id
            .compare_exchange(0, id, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clears the loop id unless a newer loop replaced it.
    pub(crate) fn end_loop(&self, id: u64) -> bool {
        self.loop_id
            .compare_exchange(id, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub(crate) fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub(crate) fn bind_session(&self, session: SessionId) {
        debug!("Session {} bound to {}.", session, self.reference);
        *self.session.lock() = Some(session);
    }

    /// Unbinds the session only if it is still the bound one.
    pub(crate) fn abort_session(&self, session: SessionId) -> bool {
        let mut bound = self.session.lock();
        if *bound == Some(session) {
            debug!("Session {} of {} aborted.", session, self.reference);
            *bound = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn enqueue(&self, item: MailboxItem<A>) -> Result<(), Error> {
        self.sender.send(item).map_err(|_| {
            Error::Send(format!("mailbox of {} is closed", self.reference))
        })
    }

    pub(crate) fn enqueue_priority(
        &self,
        request: InboundRequest,
    ) -> Result<(), InboundRequest> {
        self.priority_sender.send(request).map_err(|e| e.0)
    }

    pub(crate) fn receiver(&self) -> &tokio::sync::Mutex<MailboxReceiver<A>> {
        &self.receiver
    }

    pub(crate) fn priority_receiver(
        &self,
    ) -> &tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundRequest>> {
        &self.priority_receiver
    }

    pub(crate) fn timer_manager(&self) -> &TimerManager<A> {
        &self.timers
    }
}
