// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor Internal Execution System
//!
//! This module provides the execution engine of a virtual actor. An `ActorRunner` owns one actor
//! instance, its [`ActorContext`] and the method table of its type, and drives the drain task
//! that empties the actor's queue.
//!
//! # Core Architecture
//!
//! ## Single-flight loop
//!
//! At most one drain task runs per actor. [`ActorRunner::run_message_loop`] takes a fresh loop id
//! from the node and installs it with a compare-and-swap `0 -> id`; if another loop already
//! holds the token the call is a no-op. The drain task clears the token with `id -> 0` when it
//! exits, so it never clobbers a newer loop.
//!
//! ## Message Processing Loop
//!
//! The drain task handles queue items strictly in arrival order:
//!
//! 1. **Requests**: resolved to a typed invoker through the method table, answered with an OK
//!    response carrying the serialized return value or with an error response.
//! 2. **Timers**: the callback of the fired timer.
//! 3. **Messages**: custom local messages, handed to [`Actor::handle_message`].
//! 4. **Gateway messages**: opaque bodies forwarded by a gateway session, handed to
//!    [`Actor::on_custom_message`].
//! 5. **Session notifications**: bind or unbind the gateway session.
//! 6. **Collect**: the deactivation sentinel. Ends the loop. One-way items queued behind it
//!    are dropped; requests are answered `PositionChanged`.
//!
//! ## Reentrancy
//!
//! Each main queue item runs under a reentrant token that identifies its call chain. A request
//! whose token equals the one of the item in flight is a call back into this actor from
//! further down the same chain; waiting for the queue would deadlock, so it is sent to the
//! priority channel instead. The drain task polls that channel while idle and while the item
//! in flight is suspended, running reentrant requests concurrently up to
//! `reentrant_capacity`. Activation gets a call chain of its own, so `on_activate` may call
//! actors that call back into this one.
//!
//! ## Error handling
//!
//! Handler failures are per item: they are logged and turned into error responses, never
//! fatal to the loop. Activation failures are logged and the actor keeps serving; the actor
//! is always deactivated once collected.
//!

use crate::{
    ActorReference, Error, NodeRef,
    actor::{Actor, ActorContext, Contract},
    directory::ActorObject,
    handler::MethodTable,
    mailbox::{InboundRequest, MailboxItem},
    rpc::RpcResponse,
    session::SessionId,
};

use async_trait::async_trait;
use futures::{
    future::BoxFuture,
    stream::{FuturesUnordered, StreamExt},
};
use tokio::{select, sync::mpsc, time::Instant};
use tracing::{debug, error, info};

use std::{
    any::Any,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Execution engine of one actor cell.
pub(crate) struct ActorRunner<A: Actor> {
    actor: Arc<A>,
    ctx: Arc<ActorContext<A>>,
    methods: Arc<MethodTable<A>>,
    /// Set once the cell left the directory. No work is accepted after it.
    collected: AtomicBool,
}

impl<A: Actor> ActorRunner<A> {
    /// Builds the cell of an actor. The loop starts with the first enqueued item.
    pub(crate) fn create(
        node: NodeRef,
        reference: ActorReference,
        methods: Arc<MethodTable<A>>,
    ) -> Arc<Self> {
        debug!("Creating actor {}.", reference);
        let actor = Arc::new(A::create(reference.actor_id()));
        let ctx = Arc::new(ActorContext::new(node, reference));
        Arc::new(Self {
            actor,
            ctx,
            methods,
            collected: AtomicBool::new(false),
        })
    }

    fn is_collected(&self) -> bool {
        self.collected.load(Ordering::Acquire)
    }

    /// Starts the drain task unless one already runs.
    pub(crate) fn run_message_loop(self: &Arc<Self>) {
        if self.ctx.loop_id() != 0 || self.is_collected() {
            return;
        }
        let id = self.ctx.node().next_loop_id();
        if !self.ctx.start_loop(id) {
            return;
        }
        let runner = self.clone();
        tokio::spawn(async move {
            runner.run(id).await;
        });
    }

    /// Delivers a custom local message.
    pub(crate) fn tell(self: &Arc<Self>, message: A::Message) -> Result<(), Error> {
        if self.is_collected() {
            return Err(Error::PositionChanged(self.ctx.reference().to_string()));
        }
        self.ctx.enqueue(MailboxItem::Message(message))?;
        self.run_message_loop();
        Ok(())
    }

    async fn run(self: Arc<Self>, loop_id: u64) {
        let reference = self.ctx.reference().clone();
        debug!("Running actor {} on loop {}.", reference, loop_id);

        let mut queue = self.ctx.receiver().lock().await;
        let mut priority = self.ctx.priority_receiver().lock().await;
        let capacity = self.ctx.node().config().reentrant_capacity.max(1);
        let mut reentrant: FuturesUnordered<BoxFuture<'_, ()>> =
            FuturesUnordered::new();

        self.ctx.set_reentrant_token(self.ctx.node().next_request_id());
        let activation = self.actor.on_activate(&self.ctx);
        if let Err(e) = self
            .drive(activation, &mut priority, &mut reentrant, capacity)
            .await
        {
            error!("Activation of {} failed: {}", reference, e);
        }
        self.ctx.set_reentrant_token(0);

        loop {
            let item = select! {
                biased;
                Some(request) = priority.recv(), if reentrant.len() < capacity => {
                    reentrant.push(Box::pin(self.dispatch_request(request)));
                    continue;
                }
                Some(()) = reentrant.next(), if !reentrant.is_empty() => continue,
                item = queue.recv() => item,
            };

            let item = match item {
                Some(MailboxItem::Collect) | None => break,
                Some(item) => item,
            };

            let token = match &item {
                MailboxItem::Request(inbound) if inbound.request.reentrant_id != 0 => {
                    inbound.request.reentrant_id
                }
                _ => self.ctx.node().next_request_id(),
            };
            self.ctx.set_reentrant_token(token);
            self.drive(self.process(item), &mut priority, &mut reentrant, capacity)
                .await;
            self.ctx.set_reentrant_token(0);
        }

        while reentrant.next().await.is_some() {}

        // Requests that raced with the sweep go back to their callers to re-resolve.
        while let Ok(request) = priority.try_recv() {
            self.reject(request).await;
        }
        while let Ok(item) = queue.try_recv() {
            match item {
                MailboxItem::Request(request) => self.reject(request).await,
                MailboxItem::Message(_) | MailboxItem::Custom { .. } => {
                    debug!("One-way message to {} dropped after collection.", reference);
                }
                _ => {}
            }
        }

        if let Err(e) = self.actor.on_deactivate(&self.ctx).await {
            error!("Deactivation of {} failed: {}", reference, e);
        }
        self.ctx.timer_manager().unregister_all();
        self.ctx.set_reentrant_token(0);
        self.ctx.end_loop(loop_id);
        info!("Actor {} deactivated, loop {} exits.", reference, loop_id);
    }

    /// Polls `work` to completion while serving the reentrant requests of its call chain.
    async fn drive<'a, T>(
        &'a self,
        work: impl Future<Output = T>,
        priority: &mut mpsc::UnboundedReceiver<InboundRequest>,
        reentrant: &mut FuturesUnordered<BoxFuture<'a, ()>>,
        capacity: usize,
    ) -> T {
        tokio::pin!(work);
        loop {
            select! {
                biased;
                output = &mut work => return output,
                Some(request) = priority.recv(), if reentrant.len() < capacity => {
                    reentrant.push(Box::pin(self.dispatch_request(request)));
                }
                Some(()) = reentrant.next(), if !reentrant.is_empty() => {}
            }
        }
    }

    async fn process(&self, item: MailboxItem<A>) {
        match item {
            MailboxItem::Request(request) => self.dispatch_request(request).await,
            MailboxItem::Message(message) => {
                match self.actor.handle_message(message, &self.ctx).await {
                    Ok(()) => self.ctx.touch(),
                    Err(e) => error!(
                        "Message handler of {} failed: {}",
                        self.ctx.reference(),
                        e
                    ),
                }
            }
            MailboxItem::Custom { session, body } => {
                match self.actor.on_custom_message(session, body, &self.ctx).await {
                    Ok(()) => self.ctx.touch(),
                    Err(e) => error!(
                        "Gateway message handler of {} failed: {}",
                        self.ctx.reference(),
                        e
                    ),
                }
            }
            MailboxItem::Timer(timer) => {
                self.ctx
                    .timer_manager()
                    .tick(timer, self.actor.clone(), self.ctx.clone())
                    .await;
                self.ctx.touch();
            }
            MailboxItem::SessionBound(session) => self.ctx.bind_session(session),
            MailboxItem::SessionAborted(session) => {
                self.ctx.abort_session(session);
            }
            MailboxItem::Collect => {}
        }
    }

    async fn invoke(&self, request: &InboundRequest) -> Result<Vec<u8>, Error> {
        let contract = <A::Contract as Contract>::NAME;
        let not_found = || Error::MethodNotFound {
            actor: request.request.server_name.clone(),
            method: request.request.method_name.clone(),
        };
        if request.request.server_name != contract {
            return Err(not_found());
        }
        let invoker = self
            .methods
            .get(&request.request.method_name)
            .ok_or_else(not_found)?;
        let body = invoker(&self.actor, &self.ctx, &request.body).await?;
        self.ctx.touch();
        Ok(body)
    }

    async fn dispatch_request(&self, request: InboundRequest) {
        let request_id = request.request.request_id;
        let (response, body) = match self.invoke(&request).await {
            Ok(body) => (RpcResponse::ok(request_id), body),
            Err(e) => {
                error!(
                    "Request {} to {}.{} failed: {}",
                    request_id,
                    self.ctx.reference(),
                    request.request.method_name,
                    e
                );
                (RpcResponse::error(request_id, &e), Vec::new())
            }
        };
        self.ctx
            .node()
            .reply(request.reply_to, response, body)
            .await;
    }

    async fn reject(&self, request: InboundRequest) {
        debug!(
            "Request {} reached {} after collection.",
            request.request.request_id,
            self.ctx.reference()
        );
        let error = Error::PositionChanged(self.ctx.reference().to_string());
        self.ctx
            .node()
            .reply(
                request.reply_to,
                RpcResponse::error(request.request.request_id, &error),
                Vec::new(),
            )
            .await;
    }
}

#[async_trait]
impl<A: Actor> ActorObject for ActorRunner<A> {
    fn reference(&self) -> &ActorReference {
        self.ctx.reference()
    }

    fn last_activity(&self) -> Instant {
        self.ctx.last_activity()
    }

    fn gc_timeout(&self) -> Duration {
        A::gc_timeout()
    }

    fn weight(&self) -> u64 {
        A::weight()
    }

    async fn enqueue_request(self: Arc<Self>, request: InboundRequest) {
        if self.is_collected() {
            self.reject(request).await;
            return;
        }
        let token = request.request.reentrant_id;
        let request = if token != 0 && token == self.ctx.reentrant_token() {
            match self.ctx.enqueue_priority(request) {
                Ok(()) => {
                    self.run_message_loop();
                    return;
                }
                Err(request) => request,
            }
        } else {
            request
        };
        if let Err(e) = self.ctx.enqueue(MailboxItem::Request(request)) {
            error!("{}", e);
            return;
        }
        self.run_message_loop();
    }

    fn bind_session(self: Arc<Self>, session: SessionId) {
        if self.ctx.enqueue(MailboxItem::SessionBound(session)).is_ok() {
            self.run_message_loop();
        }
    }

    fn abort_session(self: Arc<Self>, session: SessionId) {
        if self.ctx.enqueue(MailboxItem::SessionAborted(session)).is_ok() {
            self.run_message_loop();
        }
    }

    fn deliver(self: Arc<Self>, session: SessionId, body: Vec<u8>) {
        if self.is_collected() {
            debug!(
                "Message from session {} reached {} after collection, dropped.",
                session,
                self.ctx.reference()
            );
            return;
        }
        if self.ctx.enqueue(MailboxItem::Custom { session, body }).is_ok() {
            self.run_message_loop();
        }
    }

    fn collect(&self) {
        if self.collected.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Collecting actor {}.", self.ctx.reference());
        if let Err(e) = self.ctx.enqueue(MailboxItem::Collect) {
            error!("{}", e);
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
