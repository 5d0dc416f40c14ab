// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor timers
//!
//! A timer never runs its callback on its own task: when it fires it enqueues a
//! [`MailboxItem::Timer`] into the actor's queue, so callbacks are serialized with requests and
//! messages. The sleeping task holds only a weak queue sender; once the actor is gone the
//! upgrade fails and the timer unregisters itself.
//!

use crate::{
    actor::{Actor, ActorContext},
    mailbox::{MailboxItem, WeakMailboxSender},
};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

pub type TimerId = u64;

/// Timer callback. Receives the actor and its context.
pub type TimerCallback<A> = Arc<
    dyn Fn(Arc<A>, Arc<ActorContext<A>>) -> BoxFuture<'static, ()> + Send + Sync,
>;

struct ActorTimer<A: Actor> {
    interval: Duration,
    repetition: u64,
    callback: TimerCallback<A>,
    tick_count: u64,
    task: JoinHandle<()>,
}

type Timers<A> = Arc<Mutex<HashMap<TimerId, ActorTimer<A>>>>;

/// Timers of one actor.
pub struct TimerManager<A: Actor> {
    timers: Timers<A>,
    next_id: AtomicU64,
    sender: WeakMailboxSender<A>,
}

impl<A: Actor> TimerManager<A> {
    pub(crate) fn new(sender: WeakMailboxSender<A>) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            sender,
        }
    }

    fn schedule(&self, id: TimerId, delay: Duration) -> JoinHandle<()> {
        let sender = self.sender.clone();
        let timers = Arc::downgrade(&self.timers);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let delivered = sender
                .upgrade()
                .is_some_and(|sender| sender.send(MailboxItem::Timer(id)).is_ok());
            if !delivered {
                debug!("Actor of timer {} is gone.", id);
                Self::forget(&timers, id);
            }
        })
    }

    fn forget(timers: &Weak<Mutex<HashMap<TimerId, ActorTimer<A>>>>, id: TimerId) {
        if let Some(timers) = timers.upgrade() {
            timers.lock().remove(&id);
        }
    }

    pub(crate) fn register(
        &self,
        delay: Duration,
        interval: Duration,
        repetition: u64,
        callback: TimerCallback<A>,
    ) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        // Held across scheduling so a fire can not reach the loop before the entry exists.
        let mut timers = self.timers.lock();
        let task = self.schedule(id, delay);
        timers.insert(
            id,
            ActorTimer {
                interval,
                repetition,
                callback,
                tick_count: 0,
                task,
            },
        );
        id
    }

    /// Cancels a timer. Returns `false` if it was not registered.
    pub(crate) fn unregister(&self, id: TimerId) -> bool {
        match self.timers.lock().remove(&id) {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn unregister_all(&self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.task.abort();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.lock().len()
    }

    /// Runs the callback of a fired timer, then schedules the next fire or releases the timer.
    pub(crate) async fn tick(
        &self,
        id: TimerId,
        actor: Arc<A>,
        ctx: Arc<ActorContext<A>>,
    ) {
        let callback = {
            let mut timers = self.timers.lock();
            let Some(timer) = timers.get_mut(&id) else {
                return;
            };
            timer.tick_count += 1;
            timer.callback.clone()
        };

        callback(actor, ctx).await;

        let next = {
            let mut timers = self.timers.lock();
            let Some(timer) = timers.get(&id) else {
                return;
            };
            let exhausted =
                timer.repetition != 0 && timer.tick_count >= timer.repetition;
            if exhausted || timer.interval.is_zero() {
                timers.remove(&id);
                None
            } else {
                Some(timer.interval)
            }
        };

        if let Some(interval) = next {
            let task = self.schedule(id, interval);
            match self.timers.lock().get_mut(&id) {
                Some(timer) => timer.task = task,
                None => task.abort(),
            }
        }
    }
}
