// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Execution engine tests: ordering, single-flight loops, reentrancy and failures.

mod common;

use actor::{ActorReference, Error, Node};
use common::*;
use futures::future::join_all;
use store::MemoryClaimStore;
use tokio_util::sync::CancellationToken;

use std::sync::{Arc, atomic::Ordering};

#[tokio::test]
async fn test_messages_are_handled_in_order() {
    let node = node(config("node-1"), &MemoryClaimStore::new());

    for value in 0..100 {
        node.tell::<Counter>("order-1", Record(value)).unwrap();
    }
    let log = node
        .proxy::<CounterContract>("order-1")
        .call::<Snapshot>(&())
        .await
        .unwrap();

    assert_eq!(log, (0..100).collect::<Vec<u64>>());
    assert_eq!(tally("order-1").activations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_one_item_at_a_time() {
    let node = node(config("node-1"), &MemoryClaimStore::new());
    let proxy = node.proxy::<CounterContract>("busy-1");

    let calls = (0..10).map(|_| proxy.call::<Busy>(&()));
    let results = join_all(calls).await;

    assert!(results.iter().all(|result| result.is_ok()));
    let tally = tally("busy-1");
    assert_eq!(tally.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(tally.activations.load(Ordering::SeqCst), 1);
    assert_eq!(node.directory().len(), 1);
}

#[tokio::test]
async fn test_reentrant_call_chain() {
    let node = node(config("node-1"), &MemoryClaimStore::new());

    let reply = node
        .proxy::<PingContract>("ping-1")
        .call::<Start>(&"relay-1".to_owned())
        .await
        .unwrap();

    assert_eq!(reply, "pong from ping-1");
    assert!(node.directory().contains(&ActorReference::new("Ping", "ping-1")));
    assert!(node.directory().contains(&ActorReference::new("Relay", "relay-1")));
    assert!(node.pending().is_empty());
}

#[tokio::test]
async fn test_unknown_method() {
    let node = node(config("node-1"), &MemoryClaimStore::new());

    let result = node
        .proxy::<CounterContract>("missing-1")
        .call::<Missing>(&())
        .await;

    match result {
        Err(Error::MethodNotFound { actor, method }) => {
            assert_eq!(actor, "Counter:missing-1");
            assert_eq!(method, "missing");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_failure_keeps_actor_serving() {
    let node = node(config("node-1"), &MemoryClaimStore::new());
    let proxy = node.proxy::<CounterContract>("fail-1");

    let result = proxy.call::<Fail>(&()).await;
    match result {
        Err(Error::Rpc { code, message }) => {
            assert_eq!(code, -1);
            assert!(message.contains("counter refused"));
        }
        other => panic!("unexpected result {:?}", other),
    }

    assert_eq!(proxy.call::<Append>(&7).await.unwrap(), 1);
    assert_eq!(tally("fail-1").activations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unregistered_actor_type() {
    let node = node(config("node-1"), &MemoryClaimStore::new());

    let result = node.proxy::<GhostContract>("ghost-1").call::<Boo>(&()).await;

    assert!(matches!(result, Err(Error::Rpc { code: -1, .. })));
    assert!(node.directory().is_empty());
}

#[tokio::test]
async fn test_activation_serves_calls_back() {
    let node = node(config("node-1"), &MemoryClaimStore::new());

    let opened = node
        .proxy::<LobbyContract>("lobby-1")
        .call::<Opened>(&())
        .await
        .unwrap();

    assert_eq!(opened, Some("welcome to lobby-1".to_owned()));
    assert!(
        node.directory()
            .contains(&ActorReference::new("Relay", "door-lobby-1"))
    );
}

#[tokio::test]
async fn test_failed_activation_still_serves() {
    let node = node(config("node-1"), &MemoryClaimStore::new());

    let reply = node
        .proxy::<FragileContract>("fragile-1")
        .call::<Hello>(&"bob".to_owned())
        .await
        .unwrap();
    assert_eq!(reply, "hello bob");

    let tally = tally("fragile-1");
    assert_eq!(tally.activations.load(Ordering::SeqCst), 1);

    assert!(node.directory().collect(&ActorReference::new("Fragile", "fragile-1")));
    assert!(eventually(|| tally.deactivations.load(Ordering::SeqCst) == 1).await);
    assert!(node.directory().is_empty());
}

#[tokio::test]
async fn test_tell_requires_registration() {
    let (bare, _runner) = Node::create(
        config("node-1"),
        Arc::new(MemoryClaimStore::new()),
        CancellationToken::new(),
    )
    .unwrap();

    let result = bare.tell::<Counter>("tell-1", Record(1));
    assert!(matches!(result, Err(Error::ImplementationNotFound(_))));
    assert!(bare.directory().is_empty());
}
