// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Core library for the Rush cluster runtime.
//! Provides the virtual actor execution engine, the cluster coordination layer and the claim
//! stores placement is decided through.
//! Actors are addressed by type and id, activated on first reference and reachable from any
//! node of the cluster.

pub use actor::{
    Actor, ActorContext, ActorReference, Connector, Contract, Directory,
    Discovery, Error as ActorError, ExponentialBackoffStrategy,
    FixedIntervalStrategy, Handler, LocalTransport, MemberConfig, Membership,
    Message, Method, MethodTable, NoIntervalStrategy, Node, NodeConfig, NodeRef,
    NodeRunner, PlacementResolver, RetryBackoff, RetryStrategy, ServerNode,
    Session, SessionId, StaticDiscovery, TimerId, rpc,
};

pub use store::{ClaimStore, Error as StoreError, MemoryClaimStore, claim_key};

#[cfg(feature = "sqlite")]
pub use sqlite_db::SqliteClaimStore;
