// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Placement resolver
//!
//! Finds the node that owns a virtual actor. Ownership is decided by an atomic claim in the
//! [`ClaimStore`]; the result is cached locally in a bounded LRU with the lease expiry.
//!
//! Per actor the resolver moves through `Unclaimed -> Cached+Fresh -> Cached+Stale ->
//! Unclaimed`. The cache is advisory: a stale entry is only discovered when a call through it
//! fails (`PositionChanged`) or its lease refresh is refused, and no store operation is
//! retried silently.
//!

use crate::{
    ActorReference, Error, NodeRef,
    cache::LruCache,
    membership::{Membership, ServerNode},
    rpc::{Envelope, RequestHeartBeat},
    session::{Connector, Session, SessionManager},
};

use parking_lot::{Mutex, RwLock};
use store::ClaimStore;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Locally cached claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementClaim {
    pub actor_type: String,
    pub actor_id: String,
    pub server_id: String,
    pub expires_at: Instant,
}

/// Resolves actor references to their owning node.
pub struct PlacementResolver {
    server_id: String,
    store: Arc<dyn ClaimStore>,
    membership: Membership,
    sessions: SessionManager,
    cache: Mutex<LruCache<ActorReference, PlacementClaim>>,
    ttl: Duration,
    connector: RwLock<Option<Arc<dyn Connector>>>,
    connecting: tokio::sync::Mutex<()>,
}

impl PlacementResolver {
    pub fn new(
        server_id: &str,
        store: Arc<dyn ClaimStore>,
        membership: Membership,
        sessions: SessionManager,
        cache_size: usize,
        ttl: Duration,
    ) -> Self {
        debug!(
            "Creating placement resolver on {} with {} claim store.",
            server_id,
            store.name()
        );
        Self {
            server_id: server_id.to_owned(),
            store,
            membership,
            sessions,
            cache: Mutex::new(LruCache::new(cache_size)),
            ttl,
            connector: RwLock::new(None),
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    /// Lease length of new claims.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn set_connector(&self, connector: Arc<dyn Connector>) {
        *self.connector.write() = Some(connector);
    }

    /// Number of cached claims.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    /// Cached claim of an actor, expired or not.
    pub fn cached_claim(&self, reference: &ActorReference) -> Option<PlacementClaim> {
        self.cache.lock().peek(reference).cloned()
    }

    fn is_reachable(&self, node: &ServerNode) -> bool {
        node.server_id() == self.server_id
            || node
                .session_id()
                .is_some_and(|session| self.sessions.contains(session))
    }

    /// Cached owner of an actor if its lease has not expired.
    pub fn find_position_in_cache(
        &self,
        actor_type: &str,
        actor_id: &str,
    ) -> Option<Arc<ServerNode>> {
        let reference = ActorReference::new(actor_type, actor_id);
        let server_id = {
            let mut cache = self.cache.lock();
            let claim = cache.get(&reference)?;
            if claim.expires_at <= Instant::now() {
                cache.pop(&reference);
                return None;
            }
            claim.server_id.clone()
        };
        self.membership.get_member(&server_id)
    }

    /// Owner of an actor, claiming it for a candidate node if the cache can not answer.
    ///
    /// Returns `None` when no member can host the type, or when the store names an owner this
    /// node does not know.
    pub async fn find_position(
        &self,
        actor_type: &str,
        actor_id: &str,
    ) -> Result<Option<Arc<ServerNode>>, Error> {
        if let Some(node) = self.find_position_in_cache(actor_type, actor_id) {
            if self.is_reachable(&node) {
                return Ok(Some(node));
            }
        }

        let reference = ActorReference::new(actor_type, actor_id);
        let Some(candidate) = self.membership.choose_member(actor_type) else {
            debug!("No member can host {}.", reference);
            return Ok(None);
        };

        let owner = self
            .store
            .try_claim(&reference.claim_key(), candidate.server_id(), self.ttl)
            .await?;
        let Some(node) = self.membership.get_member(&owner) else {
            warn!("Actor {} is claimed by unknown member {}.", reference, owner);
            return Ok(None);
        };

        if owner != candidate.server_id() {
            debug!(
                "Actor {} already owned by {}, candidate was {}.",
                reference,
                owner,
                candidate.server_id()
            );
        }
        self.cache.lock().put(
            reference,
            PlacementClaim {
                actor_type: actor_type.to_owned(),
                actor_id: actor_id.to_owned(),
                server_id: owner,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(Some(node))
    }

    /// Evicts the cached claim of an actor.
    pub fn remove_position(&self, actor_type: &str, actor_id: &str) {
        self.cache
            .lock()
            .pop(&ActorReference::new(actor_type, actor_id));
    }

    /// Caches a claim naming this node for an actor it was asked to serve.
    ///
    /// An existing local claim keeps its expiry.
    pub fn record_local(&self, actor_type: &str, actor_id: &str) {
        let reference = ActorReference::new(actor_type, actor_id);
        let mut cache = self.cache.lock();
        if cache
            .get(&reference)
            .is_some_and(|claim| claim.server_id == self.server_id)
        {
            return;
        }
        cache.put(
            reference,
            PlacementClaim {
                actor_type: actor_type.to_owned(),
                actor_id: actor_id.to_owned(),
                server_id: self.server_id.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    fn is_cached_local(&self, reference: &ActorReference) -> bool {
        self.cache
            .lock()
            .peek(reference)
            .is_some_and(|claim| claim.server_id == self.server_id)
    }

    /// Extends the lease of an actor owned by this node.
    ///
    /// Returns `false` without touching the store unless the cache names this node. A refused
    /// extension evicts the cached claim: the actor has moved.
    pub async fn keep_alive(
        &self,
        actor_type: &str,
        actor_id: &str,
        ttl: Duration,
    ) -> Result<bool, Error> {
        let reference = ActorReference::new(actor_type, actor_id);
        if !self.is_cached_local(&reference) {
            return Ok(false);
        }

        let extended = self
            .store
            .extend_lease(&reference.claim_key(), &self.server_id, ttl)
            .await?;
        let mut cache = self.cache.lock();
        if extended {
            if let Some(claim) = cache.get_mut(&reference) {
                claim.expires_at = Instant::now() + ttl;
            }
        } else {
            warn!("Lease of {} lost.", reference);
            cache.pop(&reference);
        }
        Ok(extended)
    }

    /// Refreshes the lease of every hosted actor this node holds a claim for.
    ///
    /// Returns the actors whose lease was refused.
    pub async fn refresh_leases(
        &self,
        references: &[ActorReference],
    ) -> Vec<ActorReference> {
        let mut lost = Vec::new();
        for reference in references {
            if !self.is_cached_local(reference) {
                continue;
            }
            match self
                .keep_alive(reference.actor_type(), reference.actor_id(), self.ttl)
                .await
            {
                Ok(true) => {}
                Ok(false) => lost.push(reference.clone()),
                Err(e) => error!("Can not refresh lease of {}: {}", reference, e),
            }
        }
        lost
    }

    /// Membership removal hook: closes the session of the node and purges its claims.
    pub fn on_remove_server(&self, node: &ServerNode) {
        if let Some(session) = node.take_session() {
            self.sessions.close(session);
        }
        let purged = self
            .cache
            .lock()
            .retain(|_, claim| claim.server_id != node.server_id());
        info!(
            "Member {} gone, {} cached claims purged.",
            node.server_id(),
            purged
        );
    }

    /// Live session to `node`, connecting on demand.
    pub async fn ensure_session(
        &self,
        local: &NodeRef,
        node: &ServerNode,
    ) -> Result<Arc<dyn Session>, Error> {
        if let Some(session) = self.live_session(node) {
            return Ok(session);
        }
        let _connecting = self.connecting.lock().await;
        if let Some(session) = self.live_session(node) {
            return Ok(session);
        }

        let connector = self.connector.read().clone().ok_or_else(|| {
            Error::SessionUnavailable(format!(
                "no connector to reach {}",
                node.server_id()
            ))
        })?;
        let session = connector.connect(local, node).await?;
        self.sessions.add(session.clone());
        node.set_session(session.id());
        info!("Connected to {} at {}.", node.server_id(), node.endpoint());
        Ok(session)
    }

    fn live_session(&self, node: &ServerNode) -> Option<Arc<dyn Session>> {
        node.session_id().and_then(|id| self.sessions.get(id))
    }

    /// Sends a heartbeat to every connected peer and connects the others.
    pub async fn heartbeat(&self, local: &NodeRef) {
        let now_sec = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        for member in self.membership.get_members() {
            if member.server_id() == self.server_id {
                continue;
            }
            match self.live_session(&member) {
                Some(session) => {
                    let heartbeat = Envelope::meta(RequestHeartBeat { now_sec });
                    if let Err(e) = session.send(heartbeat).await {
                        error!(
                            "Send heart beat to {} failed: {}",
                            member.endpoint(),
                            e
                        );
                    }
                }
                None => {
                    if let Err(e) = self.ensure_session(local, &member).await {
                        error!("Connect to {} failed: {}", member.endpoint(), e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::session::tests::RecordingSession;

    use store::MemoryClaimStore;

    fn member(id: &str) -> ServerNode {
        ServerNode::new(id, "127.0.0.1", 0, vec!["*".to_owned()])
    }

    fn resolver(
        server_id: &str,
        store: MemoryClaimStore,
        membership: Membership,
    ) -> PlacementResolver {
        PlacementResolver::new(
            server_id,
            Arc::new(store),
            membership,
            SessionManager::new(),
            16,
            Duration::from_secs(120),
        )
    }

    #[tokio::test]
    async fn test_find_position_claims_and_caches() {
        let membership = Membership::new();
        membership.add_member(member("node-1"));
        let store = MemoryClaimStore::new();
        let resolver = resolver("node-1", store.clone(), membership);

        let node = resolver.find_position("Echo", "1").await.unwrap().unwrap();
        assert_eq!(node.server_id(), "node-1");
        assert_eq!(
            store.owner("Echo:1").await.unwrap(),
            Some("node-1".to_owned())
        );
        let cached = resolver
            .cached_claim(&ActorReference::new("Echo", "1"))
            .unwrap();
        assert_eq!(cached.server_id, "node-1");
        assert!(resolver.find_position_in_cache("Echo", "1").is_some());
    }

    #[tokio::test]
    async fn test_no_candidate() {
        let membership = Membership::new();
        membership.add_member(ServerNode::new(
            "node-1",
            "127.0.0.1",
            0,
            vec!["Room".to_owned()],
        ));
        let resolver = resolver("node-1", MemoryClaimStore::new(), membership);
        assert!(resolver.find_position("Player", "42").await.unwrap().is_none());
        assert_eq!(resolver.cached(), 0);
    }

    #[tokio::test]
    async fn test_two_nodes_race_for_player() {
        let store = MemoryClaimStore::new();
        let membership_1 = Membership::new();
        let membership_2 = Membership::new();
        for membership in [&membership_1, &membership_2] {
            membership.add_member(member("node-1"));
            membership.add_member(member("node-2"));
        }
        let resolver_1 = resolver("node-1", store.clone(), membership_1);
        let resolver_2 = resolver("node-2", store.clone(), membership_2);

        let (first, second) = tokio::join!(
            resolver_1.find_position("Player", "42"),
            resolver_2.find_position("Player", "42")
        );
        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();
        assert_eq!(first.server_id(), second.server_id());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_keep_alive_requires_local_owner() {
        let store = MemoryClaimStore::new();
        let membership = Membership::new();
        membership.add_member(member("node-2"));
        let resolver = resolver("node-1", store.clone(), membership);

        assert!(!resolver.keep_alive("Echo", "1", Duration::from_secs(120)).await.unwrap());

        resolver.find_position("Echo", "1").await.unwrap().unwrap();
        assert!(!resolver.keep_alive("Echo", "1", Duration::from_secs(120)).await.unwrap());
        assert!(resolver.cached_claim(&ActorReference::new("Echo", "1")).is_some());
    }

    #[tokio::test]
    async fn test_keep_alive_lost_lease_evicts() {
        let store = MemoryClaimStore::new();
        let membership = Membership::new();
        membership.add_member(member("node-1"));
        let resolver = resolver("node-1", store.clone(), membership);

        resolver.record_local("Echo", "1");
        // The store names another owner: the actor moved.
        store
            .try_claim("Echo:1", "node-2", Duration::from_secs(120))
            .await
            .unwrap();

        assert!(!resolver.keep_alive("Echo", "1", Duration::from_secs(120)).await.unwrap());
        assert!(resolver.cached_claim(&ActorReference::new("Echo", "1")).is_none());
    }

    #[tokio::test]
    async fn test_refresh_leases() {
        let store = MemoryClaimStore::new();
        let membership = Membership::new();
        membership.add_member(member("node-1"));
        let resolver = resolver("node-1", store.clone(), membership);

        resolver.find_position("Echo", "1").await.unwrap();
        resolver.record_local("Echo", "2");
        store
            .try_claim("Echo:2", "node-2", Duration::from_secs(120))
            .await
            .unwrap();

        let lost = resolver
            .refresh_leases(&[
                ActorReference::new("Echo", "1"),
                ActorReference::new("Echo", "2"),
                ActorReference::new("Echo", "3"),
            ])
            .await;
        assert_eq!(lost, vec![ActorReference::new("Echo", "2")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_entry_is_dropped() {
        let membership = Membership::new();
        membership.add_member(member("node-1"));
        let resolver = resolver("node-1", MemoryClaimStore::new(), membership);

        resolver.record_local("Echo", "1");
        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(resolver.find_position_in_cache("Echo", "1").is_none());
        assert_eq!(resolver.cached(), 0);
    }

    #[tokio::test]
    async fn test_remove_server_purges_claims_and_session() {
        let store = MemoryClaimStore::new();
        let membership = Membership::new();
        membership.add_member(member("node-1"));
        let remote = membership.add_member(member("node-2"));
        let sessions = SessionManager::new();
        let session = RecordingSession::new(3);
        sessions.add(session.clone());
        remote.set_session(3);

        let resolver = PlacementResolver::new(
            "node-1",
            Arc::new(store.clone()),
            membership.clone(),
            sessions.clone(),
            16,
            Duration::from_secs(120),
        );
        store
            .try_claim("Echo:1", "node-2", Duration::from_secs(120))
            .await
            .unwrap();
        store
            .try_claim("Echo:2", "node-1", Duration::from_secs(120))
            .await
            .unwrap();
        resolver.find_position("Echo", "1").await.unwrap().unwrap();
        resolver.find_position("Echo", "2").await.unwrap().unwrap();
        assert_eq!(resolver.cached(), 2);

        resolver.on_remove_server(&remote);
        assert_eq!(resolver.cached(), 1);
        assert!(session.is_closed());
        assert!(sessions.is_empty());
        assert!(remote.session_id().is_none());
    }

    #[tokio::test]
    async fn test_ensure_session_without_connector() {
        let membership = Membership::new();
        let remote = membership.add_member(member("node-2"));
        let store = MemoryClaimStore::new();
        let config = crate::NodeConfig::with_server_id("node-1");
        let (node, _runner) = crate::Node::create(
            config,
            Arc::new(store.clone()),
            tokio_util::sync::CancellationToken::new(),
        )
        .unwrap();
        let resolver = resolver("node-1", store, membership);

        let result = resolver.ensure_session(&node, &remote).await;
        assert!(matches!(result, Err(Error::SessionUnavailable(_))));
    }
}
