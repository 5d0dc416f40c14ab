// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Membership registry
//!
//! The set of known cluster nodes. It is the read model the placement resolver queries to pick
//! candidates, and it notifies interested components when nodes join or leave.
//!

use crate::{Error, config::MemberConfig, session::SessionId};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use tracing::info;

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// Tag that matches every actor type.
pub const ANY_TAG: &str = "*";

/// A cluster node.
#[derive(Debug)]
pub struct ServerNode {
    server_id: String,
    address: String,
    port: u16,
    tags: Vec<String>,
    available: AtomicBool,
    session: Mutex<Option<SessionId>>,
}

impl ServerNode {
    pub fn new(server_id: &str, address: &str, port: u16, tags: Vec<String>) -> Self {
        Self {
            server_id: server_id.to_owned(),
            address: address.to_owned(),
            port,
            tags,
            available: AtomicBool::new(true),
            session: Mutex::new(None),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `address:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// True if the node hosts actors of this type.
    pub fn supports(&self, actor_type: &str) -> bool {
        self.tags
            .iter()
            .any(|tag| tag == ANY_TAG || tag == actor_type)
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Id of the session attached on first successful connect.
    pub fn session_id(&self) -> Option<SessionId> {
        *self.session.lock()
    }

    pub fn set_session(&self, session: SessionId) {
        *self.session.lock() = Some(session);
    }

    /// Detaches the session, returning it.
    pub fn take_session(&self) -> Option<SessionId> {
        self.session.lock().take()
    }
}

impl From<&MemberConfig> for ServerNode {
    fn from(config: &MemberConfig) -> Self {
        ServerNode::new(
            &config.server_id,
            &config.address,
            config.port,
            config.tags.clone(),
        )
    }
}

/// Callback fired on membership changes.
pub type MemberCallback = Arc<dyn Fn(Arc<ServerNode>) + Send + Sync>;

/// Source of the member list, polled by the node runner.
#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    async fn members(&self) -> Result<Vec<ServerNode>, Error>;
}

/// Discovery backed by a fixed member list.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    members: Vec<MemberConfig>,
}

impl StaticDiscovery {
    pub fn new(members: Vec<MemberConfig>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn members(&self) -> Result<Vec<ServerNode>, Error> {
        Ok(self.members.iter().map(ServerNode::from).collect())
    }
}

#[derive(Default)]
struct MembershipInner {
    members: RwLock<HashMap<String, Arc<ServerNode>>>,
    on_add: RwLock<Vec<MemberCallback>>,
    on_remove: RwLock<Vec<MemberCallback>>,
    pinned: RwLock<HashSet<String>>,
}

/// Registry of known cluster nodes.
#[derive(Clone, Default)]
pub struct Membership {
    inner: Arc<MembershipInner>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_members(&self) -> Vec<Arc<ServerNode>> {
        self.inner.members.read().values().cloned().collect()
    }

    pub fn get_member(&self, server_id: &str) -> Option<Arc<ServerNode>> {
        self.inner.members.read().get(server_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.read().is_empty()
    }

    /// Picks a random available member supporting `actor_type`.
    pub fn choose_member(&self, actor_type: &str) -> Option<Arc<ServerNode>> {
        let candidates: Vec<_> = self
            .inner
            .members
            .read()
            .values()
            .filter(|node| node.is_available() && node.supports(actor_type))
            .cloned()
            .collect();
        candidates.choose(&mut rand::thread_rng()).cloned()
    }

    /// Adds a member unless one with the same id exists. Returns the registered member.
    pub fn add_member(&self, node: ServerNode) -> Arc<ServerNode> {
        let (member, added) = {
            let mut members = self.inner.members.write();
            match members.get(node.server_id()) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let node = Arc::new(node);
                    members.insert(node.server_id().to_owned(), node.clone());
                    (node, true)
                }
            }
        };
        if added {
            info!("Member {} added at {}.", member.server_id(), member.endpoint());
            let callbacks = self.inner.on_add.read().clone();
            for callback in callbacks {
                callback(member.clone());
            }
        }
        member
    }

    /// Adds a member that [`Membership::refresh_members`] never removes, such as the local
    /// node.
    pub fn add_pinned_member(&self, node: ServerNode) -> Arc<ServerNode> {
        self.inner.pinned.write().insert(node.server_id().to_owned());
        self.add_member(node)
    }

    /// Removes a member and fires the removal callbacks.
    pub fn remove_member(&self, server_id: &str) -> Option<Arc<ServerNode>> {
        let removed = self.inner.members.write().remove(server_id);
        if let Some(member) = &removed {
            info!("Member {} removed.", server_id);
            let callbacks = self.inner.on_remove.read().clone();
            for callback in callbacks {
                callback(member.clone());
            }
        }
        removed
    }

    /// Replaces the member set with `nodes`: unknown nodes are added, missing ones removed,
    /// known ones keep their session and take the new availability.
    pub fn refresh_members(&self, nodes: Vec<ServerNode>) {
        let fresh: HashSet<String> =
            nodes.iter().map(|node| node.server_id().to_owned()).collect();
        let stale: Vec<String> = {
            let pinned = self.inner.pinned.read();
            self.inner
                .members
                .read()
                .keys()
                .filter(|id| !fresh.contains(*id) && !pinned.contains(*id))
                .cloned()
                .collect()
        };
        for server_id in stale {
            self.remove_member(&server_id);
        }
        for node in nodes {
            let available = node.is_available();
            let member = self.add_member(node);
            member.set_available(available);
        }
    }

    pub fn on_add(&self, callback: MemberCallback) {
        self.inner.on_add.write().push(callback);
    }

    pub fn on_remove(&self, callback: MemberCallback) {
        self.inner.on_remove.write().push(callback);
    }
}
