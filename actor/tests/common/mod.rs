// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Test actors shared by the integration tests.

#![allow(dead_code)]

use actor::{
    Actor, ActorContext, Contract, Error, Handler, MemberConfig, Method, MethodTable,
    Node, NodeConfig, NodeRef, NodeRunner, SessionId, TimerId,
};
use async_trait::async_trait;
use futures::future::BoxFuture;
use store::MemoryClaimStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// What happened to an actor id, shared between the test and the actor instances.
#[derive(Default)]
pub struct Tally {
    pub activations: AtomicUsize,
    pub deactivations: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub timer_ticks: AtomicUsize,
    pub log: Mutex<Vec<u64>>,
    pub forwarded: Mutex<Vec<(SessionId, Vec<u8>)>>,
}

pub fn tally(actor_id: &str) -> Arc<Tally> {
    static TALLIES: OnceLock<Mutex<HashMap<String, Arc<Tally>>>> = OnceLock::new();
    TALLIES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap()
        .entry(actor_id.to_owned())
        .or_default()
        .clone()
}

/// Waits until `check` holds, yielding to the runtime between tries.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Prints runtime logs in the test output, filtered by `RUST_LOG`.
pub fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(server_id: &str) -> NodeConfig {
    NodeConfig::with_server_id(server_id)
}

pub fn member(server_id: &str, tags: &[&str]) -> MemberConfig {
    MemberConfig {
        server_id: server_id.to_owned(),
        address: "127.0.0.1".to_owned(),
        port: 0,
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}

/// Creates a node with every test actor registered, plus its runner.
pub fn start(
    config: NodeConfig,
    store: &MemoryClaimStore,
    token: CancellationToken,
) -> (NodeRef, NodeRunner) {
    init_logs();
    let (node, runner) = Node::create(config, Arc::new(store.clone()), token).unwrap();
    node.register::<Counter>(
        MethodTable::new()
            .method::<Append>()
            .method::<Snapshot>()
            .method::<Busy>()
            .method::<Fail>()
            .method::<Sleep>()
            .method::<WhoAmI>()
            .method::<StartTimer>()
            .method::<StopTimer>()
            .method::<Timers>()
            .method::<Notify>(),
    );
    node.register::<Ping>(MethodTable::new().method::<Start>().method::<Pong>());
    node.register::<Relay>(MethodTable::new().method::<Forward>().method::<Knock>());
    node.register::<Lobby>(MethodTable::new().method::<Greet>().method::<Opened>());
    node.register::<Fragile>(MethodTable::new().method::<Hello>());
    (node, runner)
}

/// Creates a node with every test actor registered. Background loops do not run.
pub fn node(config: NodeConfig, store: &MemoryClaimStore) -> NodeRef {
    let (node, _runner) = start(config, store, CancellationToken::new());
    node
}

// Counter

pub struct CounterContract;

impl Contract for CounterContract {
    const NAME: &'static str = "Counter";
}

pub struct Counter {
    tally: Arc<Tally>,
}

pub struct Record(pub u64);

impl actor::Message for Record {}

#[async_trait]
impl Actor for Counter {
    type Contract = CounterContract;
    type Message = Record;

    fn create(actor_id: &str) -> Self {
        Counter {
            tally: tally(actor_id),
        }
    }

    async fn on_activate(&self, _ctx: &ActorContext<Self>) -> Result<(), Error> {
        self.tally.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_deactivate(&self, _ctx: &ActorContext<Self>) -> Result<(), Error> {
        self.tally.deactivations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn handle_message(
        &self,
        msg: Record,
        _ctx: &ActorContext<Self>,
    ) -> Result<(), Error> {
        self.tally.log.lock().unwrap().push(msg.0);
        Ok(())
    }

    async fn on_custom_message(
        &self,
        session: SessionId,
        body: Vec<u8>,
        _ctx: &ActorContext<Self>,
    ) -> Result<(), Error> {
        self.tally.forwarded.lock().unwrap().push((session, body));
        Ok(())
    }
}

macro_rules! method {
    ($name:ident, $contract:ty, $args:ty, $reply:ty, $wire:literal) => {
        pub struct $name;

        impl Method for $name {
            type Contract = $contract;
            type Args = $args;
            type Reply = $reply;
            const NAME: &'static str = $wire;
        }
    };
}

method!(Append, CounterContract, u64, usize, "append");
method!(Snapshot, CounterContract, (), Vec<u64>, "snapshot");
method!(Busy, CounterContract, (), (), "busy");
method!(Fail, CounterContract, (), (), "fail");
method!(Sleep, CounterContract, u64, (), "sleep");
method!(WhoAmI, CounterContract, (), String, "who_am_i");
method!(StartTimer, CounterContract, (u64, u64, u64), TimerId, "start_timer");
method!(StopTimer, CounterContract, TimerId, bool, "stop_timer");
method!(Timers, CounterContract, (), usize, "timers");
method!(Notify, CounterContract, String, (), "notify");
// Never registered.
method!(Missing, CounterContract, (), (), "missing");

#[async_trait]
impl Handler<Append> for Counter {
    async fn handle(&self, args: u64, _ctx: &ActorContext<Self>) -> Result<usize, Error> {
        let mut log = self.tally.log.lock().unwrap();
        log.push(args);
        Ok(log.len())
    }
}

#[async_trait]
impl Handler<Snapshot> for Counter {
    async fn handle(&self, _args: (), _ctx: &ActorContext<Self>) -> Result<Vec<u64>, Error> {
        Ok(self.tally.log.lock().unwrap().clone())
    }
}

#[async_trait]
impl Handler<Busy> for Counter {
    async fn handle(&self, _args: (), _ctx: &ActorContext<Self>) -> Result<(), Error> {
        let running = self.tally.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.tally.max_in_flight.fetch_max(running, Ordering::SeqCst);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        self.tally.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Handler<Fail> for Counter {
    async fn handle(&self, _args: (), _ctx: &ActorContext<Self>) -> Result<(), Error> {
        Err(Error::Functional("counter refused".to_owned()))
    }
}

#[async_trait]
impl Handler<Sleep> for Counter {
    async fn handle(&self, args: u64, _ctx: &ActorContext<Self>) -> Result<(), Error> {
        tokio::time::sleep(Duration::from_millis(args)).await;
        Ok(())
    }
}

#[async_trait]
impl Handler<WhoAmI> for Counter {
    async fn handle(&self, _args: (), ctx: &ActorContext<Self>) -> Result<String, Error> {
        Ok(ctx.node().server_id().to_owned())
    }
}

#[async_trait]
impl Handler<StartTimer> for Counter {
    async fn handle(
        &self,
        args: (u64, u64, u64),
        ctx: &ActorContext<Self>,
    ) -> Result<TimerId, Error> {
        let (delay, interval, repetition) = args;
        Ok(ctx.register_timer(
            Duration::from_millis(delay),
            Duration::from_millis(interval),
            repetition,
            Arc::new(
                |actor: Arc<Counter>, _ctx: Arc<ActorContext<Counter>>| -> BoxFuture<'static, ()> {
                    Box::pin(async move {
                        actor.tally.timer_ticks.fetch_add(1, Ordering::SeqCst);
                    })
                },
            ),
        ))
    }
}

#[async_trait]
impl Handler<StopTimer> for Counter {
    async fn handle(&self, args: TimerId, ctx: &ActorContext<Self>) -> Result<bool, Error> {
        Ok(ctx.unregister_timer(args))
    }
}

#[async_trait]
impl Handler<Timers> for Counter {
    async fn handle(&self, _args: (), ctx: &ActorContext<Self>) -> Result<usize, Error> {
        Ok(ctx.timers())
    }
}

#[async_trait]
impl Handler<Notify> for Counter {
    async fn handle(&self, args: String, ctx: &ActorContext<Self>) -> Result<(), Error> {
        ctx.push(args.into_bytes()).await
    }
}

// Ping calls Relay, which calls back into Ping within the same call chain.

pub struct PingContract;

impl Contract for PingContract {
    const NAME: &'static str = "Ping";
}

pub struct Ping {
    id: String,
}

#[async_trait]
impl Actor for Ping {
    type Contract = PingContract;
    type Message = ();

    fn create(actor_id: &str) -> Self {
        Ping {
            id: actor_id.to_owned(),
        }
    }
}

method!(Start, PingContract, String, String, "start");
method!(Pong, PingContract, (), String, "pong");

#[async_trait]
impl Handler<Start> for Ping {
    async fn handle(&self, relay: String, ctx: &ActorContext<Self>) -> Result<String, Error> {
        ctx.proxy::<RelayContract>(&relay)
            .call::<Forward>(&self.id)
            .await
    }
}

#[async_trait]
impl Handler<Pong> for Ping {
    async fn handle(&self, _args: (), _ctx: &ActorContext<Self>) -> Result<String, Error> {
        Ok(format!("pong from {}", self.id))
    }
}

pub struct RelayContract;

impl Contract for RelayContract {
    const NAME: &'static str = "Relay";
}

pub struct Relay;

#[async_trait]
impl Actor for Relay {
    type Contract = RelayContract;
    type Message = ();

    fn create(_actor_id: &str) -> Self {
        Relay
    }
}

method!(Forward, RelayContract, String, String, "forward");
method!(Knock, RelayContract, String, String, "knock");

#[async_trait]
impl Handler<Forward> for Relay {
    async fn handle(&self, ping: String, ctx: &ActorContext<Self>) -> Result<String, Error> {
        ctx.proxy::<PingContract>(&ping).call::<Pong>(&()).await
    }
}

#[async_trait]
impl Handler<Knock> for Relay {
    async fn handle(&self, lobby: String, ctx: &ActorContext<Self>) -> Result<String, Error> {
        ctx.proxy::<LobbyContract>(&lobby).call::<Greet>(&()).await
    }
}

// Lobby calls Relay while activating, and Relay calls back into Lobby.

pub struct LobbyContract;

impl Contract for LobbyContract {
    const NAME: &'static str = "Lobby";
}

pub struct Lobby {
    id: String,
    greeting: Mutex<Option<String>>,
}

#[async_trait]
impl Actor for Lobby {
    type Contract = LobbyContract;
    type Message = ();

    fn create(actor_id: &str) -> Self {
        Lobby {
            id: actor_id.to_owned(),
            greeting: Mutex::new(None),
        }
    }

    async fn on_activate(&self, ctx: &ActorContext<Self>) -> Result<(), Error> {
        let greeting = ctx
            .proxy::<RelayContract>(&format!("door-{}", self.id))
            .call::<Knock>(&self.id)
            .await?;
        *self.greeting.lock().unwrap() = Some(greeting);
        Ok(())
    }
}

method!(Greet, LobbyContract, (), String, "greet");
method!(Opened, LobbyContract, (), Option<String>, "opened");

#[async_trait]
impl Handler<Greet> for Lobby {
    async fn handle(&self, _args: (), _ctx: &ActorContext<Self>) -> Result<String, Error> {
        Ok(format!("welcome to {}", self.id))
    }
}

#[async_trait]
impl Handler<Opened> for Lobby {
    async fn handle(
        &self,
        _args: (),
        _ctx: &ActorContext<Self>,
    ) -> Result<Option<String>, Error> {
        Ok(self.greeting.lock().unwrap().clone())
    }
}

// Fragile fails to activate.

pub struct FragileContract;

impl Contract for FragileContract {
    const NAME: &'static str = "Fragile";
}

pub struct Fragile {
    tally: Arc<Tally>,
}

#[async_trait]
impl Actor for Fragile {
    type Contract = FragileContract;
    type Message = ();

    fn create(actor_id: &str) -> Self {
        Fragile {
            tally: tally(actor_id),
        }
    }

    fn gc_timeout() -> Duration {
        Duration::from_secs(10)
    }

    async fn on_activate(&self, _ctx: &ActorContext<Self>) -> Result<(), Error> {
        self.tally.activations.fetch_add(1, Ordering::SeqCst);
        Err(Error::Functional("no resources".to_owned()))
    }

    async fn on_deactivate(&self, _ctx: &ActorContext<Self>) -> Result<(), Error> {
        self.tally.deactivations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

method!(Hello, FragileContract, String, String, "hello");

#[async_trait]
impl Handler<Hello> for Fragile {
    async fn handle(&self, name: String, _ctx: &ActorContext<Self>) -> Result<String, Error> {
        Ok(format!("hello {}", name))
    }
}

// Contract with no registered implementation.

pub struct GhostContract;

impl Contract for GhostContract {
    const NAME: &'static str = "Ghost";
}

method!(Boo, GhostContract, (), (), "boo");
