// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Sessions
//!
//! A session is one live connection to a peer. The runtime never keeps a session alive on its
//! own: actors and members store a [`SessionId`] and resolve it through the
//! [`SessionManager`] when they need to send, so a closed connection is simply a lookup miss.
//!

use crate::{Error, NodeRef, membership::ServerNode, rpc::Envelope};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use std::{collections::HashMap, sync::Arc};

/// Process-unique session id.
pub type SessionId = u64;

/// Outbound half of a connection.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    fn id(&self) -> SessionId;

    fn is_closed(&self) -> bool;

    fn remote_address(&self) -> &str;

    /// Sends one envelope. Fails once the session is closed.
    async fn send(&self, envelope: Envelope) -> Result<(), Error>;

    /// Closes the connection. Idempotent.
    fn close(&self);
}

/// Opens sessions to other members.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects `local` to `node`. The returned session must already be registered in the
    /// session manager of `local`.
    async fn connect(
        &self,
        local: &NodeRef,
        node: &ServerNode,
    ) -> Result<Arc<dyn Session>, Error>;
}

/// Registry of the live sessions of a node.
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<dyn Session>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, session: Arc<dyn Session>) {
        debug!(
            "Session {} to {} registered.",
            session.id(),
            session.remote_address()
        );
        self.sessions.write().insert(session.id(), session);
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<dyn Session>> {
        self.sessions.write().remove(&id)
    }

    /// The session, if registered and still open.
    pub fn get(&self, id: SessionId) -> Option<Arc<dyn Session>> {
        self.sessions
            .read()
            .get(&id)
            .filter(|session| !session.is_closed())
            .cloned()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Closes a session and forgets it.
    pub fn close(&self, id: SessionId) {
        if let Some(session) = self.remove(id) {
            session.close();
        }
    }

    /// Closes every session.
    pub fn close_all(&self) {
        let sessions: Vec<_> =
            self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close();
        }
    }
}
