// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor directory
//!
//! The directory holds the actor cells active on this node, keyed by [`ActorReference`]. Cells
//! are created the first time they are referenced, through the factory registered for their
//! type, and leave the directory when the GC sweep finds them idle past their
//! [`gc_timeout`](crate::Actor::gc_timeout).
//!

use crate::{
    ActorReference, Error, NodeRef,
    mailbox::InboundRequest,
    session::SessionId,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use std::{
    any::Any,
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

/// Type-erased actor cell.
#[async_trait]
pub(crate) trait ActorObject: Send + Sync + 'static {
    fn reference(&self) -> &ActorReference;

    fn last_activity(&self) -> Instant;

    fn gc_timeout(&self) -> Duration;

    fn weight(&self) -> u64;

    /// Queues a request, or runs it on the priority channel if it belongs to the call chain in
    /// flight. A collected cell answers `PositionChanged`.
    async fn enqueue_request(self: Arc<Self>, request: InboundRequest);

    fn bind_session(self: Arc<Self>, session: SessionId);

    fn abort_session(self: Arc<Self>, session: SessionId);

    /// Queues a message forwarded by a gateway session.
    fn deliver(self: Arc<Self>, session: SessionId, body: Vec<u8>);

    /// Enqueues the deactivation sentinel. Idempotent.
    fn collect(&self);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Builds the cell of an actor type.
pub(crate) type ActorFactory =
    Arc<dyn Fn(&NodeRef, ActorReference) -> Arc<dyn ActorObject> + Send + Sync>;

#[derive(Default)]
struct DirectoryInner {
    factories: RwLock<HashMap<String, ActorFactory>>,
    actors: RwLock<HashMap<ActorReference, Arc<dyn ActorObject>>>,
    weight: AtomicU64,
}

/// Active actors of a node.
#[derive(Clone, Default)]
pub struct Directory {
    inner: Arc<DirectoryInner>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, actor_type: &str, factory: ActorFactory) {
        debug!("Actor type {} registered.", actor_type);
        self.inner
            .factories
            .write()
            .insert(actor_type.to_owned(), factory);
    }

    /// True if an implementation is registered for the type.
    pub fn is_registered(&self, actor_type: &str) -> bool {
        self.inner.factories.read().contains_key(actor_type)
    }

    /// Live cell of an actor, built on first reference.
    pub(crate) fn get_or_create(
        &self,
        node: &NodeRef,
        reference: &ActorReference,
    ) -> Result<Arc<dyn ActorObject>, Error> {
        if let Some(actor) = self.get(reference) {
            return Ok(actor);
        }
        let factory = self
            .inner
            .factories
            .read()
            .get(reference.actor_type())
            .cloned()
            .ok_or_else(|| {
                Error::ImplementationNotFound(reference.actor_type().to_owned())
            })?;

        let mut actors = self.inner.actors.write();
        let actor = actors
            .entry(reference.clone())
            .or_insert_with(|| factory(node, reference.clone()))
            .clone();
        Ok(actor)
    }

    pub(crate) fn get(
        &self,
        reference: &ActorReference,
    ) -> Option<Arc<dyn ActorObject>> {
        self.inner.actors.read().get(reference).cloned()
    }

    pub fn contains(&self, reference: &ActorReference) -> bool {
        self.inner.actors.read().contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.inner.actors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.actors.read().is_empty()
    }

    /// References of the active actors.
    pub fn references(&self) -> Vec<ActorReference> {
        self.inner.actors.read().keys().cloned().collect()
    }

    /// Recomputes the node weight from the active actors.
    pub fn calc_weight(&self) -> u64 {
        let weight = self
            .inner
            .actors
            .read()
            .values()
            .map(|actor| actor.weight())
            .sum();
        self.inner.weight.store(weight, Ordering::Release);
        weight
    }

    /// Weight computed by the last [`Directory::calc_weight`].
    pub fn weight(&self) -> u64 {
        self.inner.weight.load(Ordering::Acquire)
    }

    /// Collects one actor now, whatever its idle time.
    pub fn collect(&self, reference: &ActorReference) -> bool {
        match self.inner.actors.write().remove(reference) {
            Some(actor) => {
                actor.collect();
                true
            }
            None => false,
        }
    }

    /// Collects every actor idle past its timeout. Returns how many were collected.
    ///
    /// The pass stops once `budget` is spent; the remaining actors wait for the next pass.
    pub fn sweep(&self, budget: Duration) -> usize {
        let started = std::time::Instant::now();
        let now = Instant::now();
        let expired: Vec<Arc<dyn ActorObject>> = self
            .inner
            .actors
            .read()
            .values()
            .filter(|actor| actor.last_activity() + actor.gc_timeout() <= now)
            .cloned()
            .collect();

        let mut collected = Vec::with_capacity(expired.len());
        for actor in expired {
            if started.elapsed() >= budget {
                warn!(
                    "GC pass out of budget after {} actors.",
                    collected.len()
                );
                break;
            }
            actor.collect();
            collected.push(actor.reference().clone());
        }

        if !collected.is_empty() {
            let mut actors = self.inner.actors.write();
            for reference in &collected {
                actors.remove(reference);
            }
            info!("GC collected {} actors.", collected.len());
        }
        collected.len()
    }

    /// Collects every actor.
    pub fn clear(&self) {
        let actors: Vec<_> =
            self.inner.actors.write().drain().map(|(_, a)| a).collect();
        for actor in actors {
            actor.collect();
        }
    }
}
