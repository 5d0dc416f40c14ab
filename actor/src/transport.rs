// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # In-process transport
//!
//! [`LocalTransport`] connects nodes living in the same process through in-memory duplex
//! pipes. Frames go through the node's [`EnvelopeCodec`](crate::rpc::EnvelopeCodec) exactly as
//! they would on a socket, so a multi-node cluster inside one process exercises the whole wire
//! path. Real socket transports plug in through the same [`Connector`] and [`Session`] traits.
//!

use crate::{
    Error, NodeRef,
    membership::ServerNode,
    rpc::{Envelope, EnvelopeCodec},
    sequence::SequenceId,
    session::{Connector, Session, SessionId},
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::io::{DuplexStream, WriteHalf};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use tracing::{debug, error, info};

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// Capacity of each in-memory pipe.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

type Writer = FramedWrite<WriteHalf<DuplexStream>, EnvelopeCodec>;

/// One end of an in-memory connection.
pub struct LocalSession {
    id: SessionId,
    remote_address: String,
    writer: tokio::sync::Mutex<Option<Writer>>,
    closed: AtomicBool,
    token: CancellationToken,
}

impl LocalSession {
    /// Opens the end of a pipe owned by `node` and starts pumping its inbound frames into
    /// [`NodeRef::on_message`].
    fn open(
        id: SessionId,
        node: &NodeRef,
        remote_address: &str,
        io: DuplexStream,
    ) -> Arc<Self> {
        let (reader, writer) = tokio::io::split(io);
        let session = Arc::new(Self {
            id,
            remote_address: remote_address.to_owned(),
            writer: tokio::sync::Mutex::new(Some(FramedWrite::new(
                writer,
                node.codec().clone(),
            ))),
            closed: AtomicBool::new(false),
            token: CancellationToken::new(),
        });

        let mut frames = FramedRead::new(reader, node.codec().clone());
        let node = node.clone();
        let token = session.token.clone();
        let weak = Arc::downgrade(&session);
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = token.cancelled() => break,
                    frame = frames.next() => frame,
                };
                match frame {
                    Some(Ok(envelope)) => node.on_message(id, envelope).await,
                    Some(Err(e)) => {
                        error!("Session {} on {} failed: {}", id, node.server_id(), e);
                        break;
                    }
                    None => {
                        debug!("Session {} closed by peer.", id);
                        break;
                    }
                }
            }
            if let Some(session) = weak.upgrade() {
                session.close();
            }
            node.sessions().remove(id);
        });
        session
    }
}

#[async_trait]
impl Session for LocalSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn remote_address(&self) -> &str {
        &self.remote_address
    }

    async fn send(&self, envelope: Envelope) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Transport(format!("session {} is closed", self.id)));
        }
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or_else(|| {
            Error::Transport(format!("session {} is closed", self.id))
        })?;
        writer.send(envelope).await
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.token.cancel();
        // A sender holding the writer drops it with the session.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }
}

struct LocalTransportInner {
    nodes: RwLock<HashMap<String, NodeRef>>,
    session_ids: SequenceId,
    capacity: usize,
}

/// Connector between nodes of the same process.
#[derive(Clone)]
pub struct LocalTransport {
    inner: Arc<LocalTransportInner>,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PIPE_CAPACITY)
    }
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose pipes buffer `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(LocalTransportInner {
                nodes: RwLock::new(HashMap::new()),
                session_ids: SequenceId::new(),
                capacity,
            }),
        }
    }

    /// Makes `node` reachable and installs this transport as its connector.
    pub fn attach(&self, node: &NodeRef) {
        self.inner
            .nodes
            .write()
            .insert(node.server_id().to_owned(), node.clone());
        node.set_connector(Arc::new(self.clone()));
        info!("Node {} attached to local transport.", node.server_id());
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.read().is_empty()
    }
}

#[async_trait]
impl Connector for LocalTransport {
    async fn connect(
        &self,
        local: &NodeRef,
        node: &ServerNode,
    ) -> Result<Arc<dyn Session>, Error> {
        let remote = self
            .inner
            .nodes
            .read()
            .get(node.server_id())
            .cloned()
            .ok_or_else(|| {
                Error::SessionUnavailable(format!(
                    "{} at {} is not reachable",
                    node.server_id(),
                    node.endpoint()
                ))
            })?;

        let (local_io, remote_io) = tokio::io::duplex(self.inner.capacity);
        let outbound = LocalSession::open(
            self.inner.session_ids.next_id(),
            local,
            remote.server_id(),
            local_io,
        );
        let inbound = LocalSession::open(
            self.inner.session_ids.next_id(),
            &remote,
            local.server_id(),
            remote_io,
        );

        remote.sessions().add(inbound.clone());
        if let Some(member) = remote.membership().get_member(local.server_id()) {
            if member.session_id().is_none() {
                member.set_session(inbound.id());
            }
        }
        local.sessions().add(outbound.clone());
        debug!(
            "Session {} from {} to {} opened.",
            outbound.id(),
            local.server_id(),
            remote.server_id()
        );
        Ok(outbound)
    }
}
