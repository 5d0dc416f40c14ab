// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Node
//!
//! The `node` module provides the `Node` type, the process-wide service object of a cluster
//! member. `Node::create` wires Membership, then the placement resolver, the RPC dispatcher and
//! the actor directory, and returns a cheap-to-clone [`NodeRef`] plus the [`NodeRunner`] that
//! drives the background loops (GC sweep, weight, heartbeat, lease refresh and membership
//! refresh) until the cancellation token fires.
//!

use crate::{
    ActorReference, Error,
    actor::{Actor, Contract},
    config::NodeConfig,
    directory::{ActorFactory, ActorObject, Directory},
    handler::MethodTable,
    mailbox::ReplyTo,
    membership::{Discovery, Membership, ServerNode},
    placement::PlacementResolver,
    rpc::{
        ActorProxy, Dispatcher, Envelope, EnvelopeCodec, PendingCalls, RpcResponse,
    },
    runner::ActorRunner,
    sequence::SequenceId,
    session::{Connector, SessionId, SessionManager},
};

use parking_lot::RwLock;
use store::ClaimStore;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

/// Node factory.
pub struct Node {}

impl Node {
    /// Creates a node.
    ///
    /// # Returns
    ///
    /// Returns a tuple with the node reference and the node runner.
    pub fn create(
        config: NodeConfig,
        store: Arc<dyn ClaimStore>,
        token: CancellationToken,
    ) -> Result<(NodeRef, NodeRunner), Error> {
        config.validate()?;
        debug!("Creating node {}.", config.server_id);

        let membership = Membership::new();
        let local = membership.add_pinned_member(ServerNode::new(
            &config.server_id,
            &config.address,
            config.port,
            config.tags.clone(),
        ));
        for member in &config.members {
            if member.server_id != config.server_id {
                membership.add_member(ServerNode::from(member));
            }
        }

        let sessions = SessionManager::new();
        let resolver = PlacementResolver::new(
            &config.server_id,
            store,
            membership.clone(),
            sessions.clone(),
            config.placement_cache_size,
            config.placement_ttl(),
        );
        let dispatcher = Dispatcher::new(PendingCalls::new());
        let directory = Directory::new();
        let codec = EnvelopeCodec::new(config.magic.as_bytes(), config.max_frame_size);

        let inner = Arc::new(NodeInner {
            loop_ids: SequenceId::with_seed(config.sequence_seed),
            request_ids: SequenceId::with_seed(config.sequence_seed),
            config,
            local,
            membership,
            sessions,
            resolver,
            dispatcher,
            directory,
            codec,
            discovery: RwLock::new(None),
            token,
        });

        let weak: Weak<NodeInner> = Arc::downgrade(&inner);
        inner.membership.on_remove(Arc::new(move |node| {
            if let Some(inner) = weak.upgrade() {
                inner.resolver.on_remove_server(&node);
            }
        }));

        let node = NodeRef { inner };
        let runner = NodeRunner { node: node.clone() };
        Ok((node, runner))
    }
}

struct NodeInner {
    config: NodeConfig,
    local: Arc<ServerNode>,
    membership: Membership,
    sessions: SessionManager,
    resolver: PlacementResolver,
    dispatcher: Dispatcher,
    directory: Directory,
    codec: EnvelopeCodec,
    loop_ids: SequenceId,
    request_ids: SequenceId,
    discovery: RwLock<Option<Arc<dyn Discovery>>>,
    token: CancellationToken,
}

/// Node reference.
#[derive(Clone)]
pub struct NodeRef {
    inner: Arc<NodeInner>,
}

impl NodeRef {
    pub fn server_id(&self) -> &str {
        &self.inner.config.server_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// This node as a cluster member.
    pub fn local_node(&self) -> &Arc<ServerNode> {
        &self.inner.local
    }

    pub fn membership(&self) -> &Membership {
        &self.inner.membership
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn resolver(&self) -> &PlacementResolver {
        &self.inner.resolver
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn directory(&self) -> &Directory {
        &self.inner.directory
    }

    /// Wire codec configured for this node.
    pub fn codec(&self) -> &EnvelopeCodec {
        &self.inner.codec
    }

    pub fn pending(&self) -> &PendingCalls {
        self.inner.dispatcher.pending()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn next_loop_id(&self) -> u64 {
        self.inner.loop_ids.next_id()
    }

    pub fn next_request_id(&self) -> u64 {
        self.inner.request_ids.next_id()
    }

    /// Installs an actor type with its method table.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// node.register::<Echo>(MethodTable::new().method::<EchoMethod>());
    /// ```
    pub fn register<A: Actor>(&self, methods: MethodTable<A>) {
        let methods = Arc::new(methods);
        let factory: ActorFactory = Arc::new(move |node: &NodeRef, reference: ActorReference| {
            let runner: Arc<dyn ActorObject> =
                ActorRunner::<A>::create(node.clone(), reference, methods.clone());
            runner
        });
        self.inner
            .directory
            .register(<A::Contract as Contract>::NAME, factory);
    }

    /// Proxy to an actor, outside any call chain.
    pub fn proxy<C: Contract>(&self, actor_id: &str) -> ActorProxy<C> {
        ActorProxy::new(self.clone(), actor_id)
    }

    /// Delivers a custom message to a local actor, activating it if needed.
    pub fn tell<A: Actor>(&self, actor_id: &str, message: A::Message) -> Result<(), Error> {
        let reference = ActorReference::new(<A::Contract as Contract>::NAME, actor_id);
        let runner = self
            .get_or_create(&reference)?
            .into_any()
            .downcast::<ActorRunner<A>>()
            .map_err(|_| {
                Error::ImplementationNotFound(format!(
                    "{} is registered with another implementation",
                    reference.actor_type()
                ))
            })?;
        runner.tell(message)
    }

    /// Entry point of inbound frames, called by the transport for every decoded envelope.
    pub async fn on_message(&self, session: SessionId, envelope: Envelope) {
        self.inner.dispatcher.route(self, session, envelope).await;
    }

    pub fn set_connector(&self, connector: Arc<dyn Connector>) {
        self.inner.resolver.set_connector(connector);
    }

    /// Source of the member list polled by the runner.
    pub fn set_discovery(&self, discovery: Arc<dyn Discovery>) {
        *self.inner.discovery.write() = Some(discovery);
    }

    /// Replaces the member set with the one reported by the discovery, if any.
    pub async fn refresh_members(&self) {
        let discovery = self.inner.discovery.read().clone();
        let Some(discovery) = discovery else {
            return;
        };
        match discovery.members().await {
            Ok(members) => self.inner.membership.refresh_members(members),
            Err(e) => error!("Can not refresh members: {}", e),
        }
    }

    /// Refreshes the leases of the hosted actors and collects the ones that moved.
    pub async fn refresh_leases(&self) {
        let references = self.inner.directory.references();
        let lost = self.inner.resolver.refresh_leases(&references).await;
        for reference in lost {
            info!("Actor {} moved, collecting it.", reference);
            self.inner.directory.collect(&reference);
        }
    }

    pub(crate) fn get_or_create(
        &self,
        reference: &ActorReference,
    ) -> Result<Arc<dyn ActorObject>, Error> {
        self.inner.directory.get_or_create(self, reference)
    }

    pub(crate) async fn reply(
        &self,
        reply_to: ReplyTo,
        response: RpcResponse,
        body: Vec<u8>,
    ) {
        self.inner.dispatcher.reply(self, reply_to, response, body).await;
    }
}

/// Node runner.
pub struct NodeRunner {
    node: NodeRef,
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl NodeRunner {
    /// Runs the background loops of the node until its token is cancelled.
    pub async fn run(&mut self) {
        let node = &self.node;
        let config = node.config();
        debug!("Running node {}...", node.server_id());

        let mut gc = ticker(config.gc_interval());
        let mut weight = ticker(config.weight_interval());
        let mut heartbeat = ticker(config.heartbeat_interval());
        let mut leases = ticker(config.lease_refresh());
        let mut members = ticker(config.membership_refresh());

        loop {
            tokio::select! {
                _ = node.token().cancelled() => break,
                _ = gc.tick() => {
                    node.directory().sweep(config.gc_budget());
                }
                _ = weight.tick() => {
                    let weight = node.directory().calc_weight();
                    debug!("Node {} weight {}.", node.server_id(), weight);
                }
                _ = heartbeat.tick() => node.resolver().heartbeat(node).await,
                _ = leases.tick() => node.refresh_leases().await,
                _ = members.tick() => node.refresh_members().await,
            }
        }

        debug!("Stopping node {}...", node.server_id());
        node.directory().clear();
        node.sessions().close_all();
        debug!("Node {} stopped.", node.server_id());
    }
}
