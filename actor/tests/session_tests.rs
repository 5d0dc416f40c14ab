// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Gateway sessions and inbound envelope routing.

mod common;

use actor::{
    ActorReference, Error, Session, SessionId,
    rpc::{
        Envelope, Metadata, NotifyActorSessionAborted, NotifyNewActorMessage,
        NotifyNewActorSession, RequestHeartBeat, RpcRequest,
    },
};
use async_trait::async_trait;
use common::*;
use store::MemoryClaimStore;

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

// Session that keeps everything sent through it.
struct RecordingSession {
    id: SessionId,
    sent: Mutex<Vec<Envelope>>,
    closed: AtomicBool,
}

impl RecordingSession {
    fn new(id: SessionId) -> Arc<Self> {
        Arc::new(Self {
            id,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Session for RecordingSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn remote_address(&self) -> &str {
        "gateway"
    }

    async fn send(&self, envelope: Envelope) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Transport(format!("session {} is closed", self.id)));
        }
        self.sent.lock().unwrap().push(envelope);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[tokio::test]
async fn test_push_to_bound_session() {
    let node = node(config("node-1"), &MemoryClaimStore::new());
    let gateway = RecordingSession::new(77);
    node.sessions().add(gateway.clone());
    let proxy = node.proxy::<CounterContract>("gateway-1");

    // Nothing bound yet.
    assert!(proxy.call::<Notify>(&"early".to_owned()).await.is_err());

    node.on_message(
        77,
        Envelope::meta(NotifyNewActorSession {
            actor_type: "Counter".to_owned(),
            actor_id: "gateway-1".to_owned(),
            session_id: 77,
        }),
    )
    .await;
    proxy.call::<Notify>(&"hello".to_owned()).await.unwrap();

    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].meta,
        Metadata::NotifyNewActorMessage(NotifyNewActorMessage {
            actor_type: "Counter".to_owned(),
            actor_id: "gateway-1".to_owned(),
            session_id: 77,
        })
    );
    assert_eq!(sent[0].body, b"hello".to_vec());

    node.on_message(
        77,
        Envelope::meta(NotifyActorSessionAborted {
            actor_type: "Counter".to_owned(),
            actor_id: "gateway-1".to_owned(),
            session_id: 77,
        }),
    )
    .await;
    let result = proxy.call::<Notify>(&"late".to_owned()).await;
    assert!(matches!(result, Err(Error::Rpc { code: -1, .. })));
    assert_eq!(gateway.sent().len(), 1);
}

#[tokio::test]
async fn test_abort_of_another_session_is_ignored() {
    let node = node(config("node-1"), &MemoryClaimStore::new());
    let gateway = RecordingSession::new(78);
    node.sessions().add(gateway.clone());
    let proxy = node.proxy::<CounterContract>("gateway-2");

    node.on_message(
        78,
        Envelope::meta(NotifyNewActorSession {
            actor_type: "Counter".to_owned(),
            actor_id: "gateway-2".to_owned(),
            session_id: 78,
        }),
    )
    .await;
    node.on_message(
        79,
        Envelope::meta(NotifyActorSessionAborted {
            actor_type: "Counter".to_owned(),
            actor_id: "gateway-2".to_owned(),
            session_id: 79,
        }),
    )
    .await;

    proxy.call::<Notify>(&"still here".to_owned()).await.unwrap();
    assert_eq!(gateway.sent().len(), 1);
}

#[tokio::test]
async fn test_push_to_closed_session_fails() {
    let node = node(config("node-1"), &MemoryClaimStore::new());
    let gateway = RecordingSession::new(80);
    node.sessions().add(gateway.clone());
    let proxy = node.proxy::<CounterContract>("gateway-3");

    node.on_message(
        80,
        Envelope::meta(NotifyNewActorSession {
            actor_type: "Counter".to_owned(),
            actor_id: "gateway-3".to_owned(),
            session_id: 80,
        }),
    )
    .await;
    gateway.close();

    let result = proxy.call::<Notify>(&"lost".to_owned()).await;
    assert!(matches!(result, Err(Error::Rpc { code: -1, .. })));
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn test_abort_for_inactive_actor_creates_nothing() {
    let node = node(config("node-1"), &MemoryClaimStore::new());

    node.on_message(
        81,
        Envelope::meta(NotifyActorSessionAborted {
            actor_type: "Counter".to_owned(),
            actor_id: "gateway-4".to_owned(),
            session_id: 81,
        }),
    )
    .await;

    assert!(node.directory().is_empty());
}

#[tokio::test]
async fn test_gateway_message_for_unknown_type_creates_nothing() {
    let node = node(config("node-1"), &MemoryClaimStore::new());

    node.on_message(
        82,
        Envelope::new(
            NotifyNewActorMessage {
                actor_type: "Ghost".to_owned(),
                actor_id: "gateway-5".to_owned(),
                session_id: 82,
            },
            b"hello".to_vec(),
        ),
    )
    .await;

    assert!(node.directory().is_empty());
}

#[tokio::test]
async fn test_request_for_another_server() {
    let node = node(config("node-1"), &MemoryClaimStore::new());
    let peer = RecordingSession::new(90);
    node.sessions().add(peer.clone());

    let request = RpcRequest {
        server_name: "Counter".to_owned(),
        method_name: "append".to_owned(),
        actor_id: "misdirected-1".to_owned(),
        reentrant_id: 0,
        request_id: 9,
        server_id: "node-9".to_owned(),
    };
    node.on_message(90, Envelope::meta(request)).await;

    let sent = peer.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0].meta {
        Metadata::Response(response) => {
            assert_eq!(response.request_id, 9);
            assert_eq!(response.error_code, -1004);
        }
        other => panic!("unexpected message {:?}", other),
    }
    assert!(
        !node
            .directory()
            .contains(&ActorReference::new("Counter", "misdirected-1"))
    );
}

#[tokio::test]
async fn test_request_from_peer_is_answered() {
    let node = node(config("node-1"), &MemoryClaimStore::new());
    let peer = RecordingSession::new(91);
    node.sessions().add(peer.clone());

    let request = RpcRequest {
        server_name: "Counter".to_owned(),
        method_name: "who_am_i".to_owned(),
        actor_id: "peer-1".to_owned(),
        reentrant_id: 0,
        request_id: 10,
        server_id: "node-1".to_owned(),
    };
    node.on_message(91, Envelope::meta(request)).await;

    assert!(eventually(|| peer.sent().len() == 1).await);
    let sent = peer.sent();
    match &sent[0].meta {
        Metadata::Response(response) => {
            assert_eq!(response.request_id, 10);
            assert!(response.is_ok());
        }
        other => panic!("unexpected message {:?}", other),
    }
    let server_id: String = actor::rpc::payload::decode(&sent[0].body).unwrap();
    assert_eq!(server_id, "node-1");

    // Serving the request recorded the local claim.
    let claim = node
        .resolver()
        .cached_claim(&ActorReference::new("Counter", "peer-1"))
        .unwrap();
    assert_eq!(claim.server_id, "node-1");
}

#[tokio::test]
async fn test_heartbeat_is_answered() {
    let node = node(config("node-1"), &MemoryClaimStore::new());
    let peer = RecordingSession::new(92);
    node.sessions().add(peer.clone());

    node.on_message(92, Envelope::meta(RequestHeartBeat { now_sec: 1234 }))
        .await;

    let sent = peer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].meta.name(), "ResponseHeartBeat");
}
