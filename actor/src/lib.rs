// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Rush Virtual Actor Runtime
//!
//! A distributed virtual actor runtime. Actors are durable logical entities addressed by
//! `type + id`: they are created on demand the first time something references them, execute
//! with strict per-actor serialization, and are reachable from any node of the cluster through
//! location-transparent remote calls.
//!
//! ## Overview
//!
//! The runtime has two halves:
//!
//! - **The execution engine**: every active actor owns an [`ActorContext`] with an ordered
//!   queue, a priority channel for reentrant calls, a single-flight drain loop, timers and an
//!   idle deadline. Actors idle for longer than [`Actor::gc_timeout`] are deactivated by the
//!   node's GC sweep.
//! - **The cluster coordination layer**: the [`PlacementResolver`] decides which node owns an
//!   actor through an atomic claim with a time-to-live in a shared [`store::ClaimStore`], and
//!   caches the answer in a bounded LRU. Calls travel as [`rpc::Envelope`]s framed by the
//!   [`rpc::EnvelopeCodec`]; the [`rpc::ActorProxy`] retries calls that reach a node that no
//!   longer owns the actor.
//!
//! Placement is best effort: there is no consensus protocol, leases are short, and delivery
//! is at most once per attempt.
//!
//! ## Getting Started
//!
//! ### Defining an actor
//!
//! ```ignore
//! use actor::{Actor, ActorContext, Contract, Error, Handler, Method};
//! use async_trait::async_trait;
//!
//! pub struct EchoContract;
//!
//! impl Contract for EchoContract {
//!     const NAME: &'static str = "Echo";
//! }
//!
//! pub struct Say;
//!
//! impl Method for Say {
//!     type Contract = EchoContract;
//!     type Args = String;
//!     type Reply = String;
//!     const NAME: &'static str = "say";
//! }
//!
//! pub struct Echo;
//!
//! #[async_trait]
//! impl Actor for Echo {
//!     type Contract = EchoContract;
//!     type Message = ();
//!
//!     fn create(_actor_id: &str) -> Self {
//!         Echo
//!     }
//! }
//!
//! #[async_trait]
//! impl Handler<Say> for Echo {
//!     async fn handle(&self, args: String, _ctx: &ActorContext<Self>) -> Result<String, Error> {
//!         Ok(args)
//!     }
//! }
//! ```
//!
//! ### Running a node
//!
//! ```ignore
//! use actor::{MethodTable, Node, NodeConfig};
//! use store::MemoryClaimStore;
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let (node, mut runner) = Node::create(
//!     NodeConfig::load("node.toml")?,
//!     Arc::new(MemoryClaimStore::new()),
//!     token.clone(),
//! )?;
//! node.register::<Echo>(MethodTable::new().method::<Say>());
//! tokio::spawn(async move { runner.run().await });
//!
//! let reply = node.proxy::<EchoContract>("1").call::<Say>(&"hello".to_owned()).await?;
//! ```
//!

mod actor;
mod cache;
mod config;
mod directory;
mod error;
mod handler;
mod mailbox;
mod membership;
mod node;
mod placement;
mod reference;
mod retry;
pub mod rpc;
mod runner;
mod sequence;
mod session;
mod timer;
mod transport;

pub use actor::{Actor, ActorContext, Contract, DEFAULT_GC_TIMEOUT, Message};
pub use cache::LruCache;
pub use config::{MemberConfig, NodeConfig};
pub use directory::Directory;
pub use error::Error;
pub use handler::{Handler, Method, MethodTable};
pub use membership::{
    ANY_TAG, Discovery, MemberCallback, Membership, ServerNode, StaticDiscovery,
};
pub use node::{Node, NodeRef, NodeRunner};
pub use placement::{PlacementClaim, PlacementResolver};
pub use reference::ActorReference;
pub use retry::{
    ExponentialBackoffStrategy, FixedIntervalStrategy, NoIntervalStrategy,
    RetryBackoff, RetryStrategy,
};
pub use sequence::{SHIFT, SequenceId};
pub use session::{Connector, Session, SessionId, SessionManager};
pub use timer::{TimerCallback, TimerId};
pub use transport::{DEFAULT_PIPE_CAPACITY, LocalSession, LocalTransport};
