// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Method handlers
//!
//! A remote method is a type implementing [`Method`]: its contract, argument and reply types
//! and the name it travels under. Actors implement [`Handler<M>`] for every method they serve,
//! and a [`MethodTable`] maps the wire name to a typed invoker once per actor type, so inbound
//! requests never go through string dispatch on the actor itself.
//!

use crate::{
    Error,
    actor::{Actor, ActorContext, Contract},
    rpc::payload,
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};

use std::collections::HashMap;

/// A remote method of a contract.
///
/// # Examples
///
/// ```ignore
/// pub struct Echo;
///
/// impl Method for Echo {
///     type Contract = EchoContract;
///     type Args = String;
///     type Reply = String;
///     const NAME: &'static str = "echo";
/// }
/// ```
pub trait Method: Send + Sync + 'static {
    type Contract: Contract;
    type Args: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Reply: Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Wire name of the method.
    const NAME: &'static str;
}

/// Implementation of a method by an actor.
#[async_trait]
pub trait Handler<M: Method>: Actor {
    async fn handle(
        &self,
        args: M::Args,
        ctx: &ActorContext<Self>,
    ) -> Result<M::Reply, Error>;
}

/// Decodes arguments, runs the handler and encodes its reply.
pub(crate) type Invoker<A> = for<'a> fn(
    &'a A,
    &'a ActorContext<A>,
    &'a [u8],
) -> BoxFuture<'a, Result<Vec<u8>, Error>>;

fn invoke<'a, A, M>(
    actor: &'a A,
    ctx: &'a ActorContext<A>,
    body: &'a [u8],
) -> BoxFuture<'a, Result<Vec<u8>, Error>>
where
    A: Handler<M>,
    M: Method,
{
    Box::pin(async move {
        let args: M::Args = payload::decode(body)?;
        let reply = <A as Handler<M>>::handle(actor, args, ctx).await?;
        payload::encode(&reply, ctx.node().config().compress_threshold)
    })
}

/// Method name to invoker map of one actor type.
pub struct MethodTable<A: Actor> {
    methods: HashMap<&'static str, Invoker<A>>,
}

impl<A: Actor> Default for MethodTable<A> {
    fn default() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }
}

impl<A: Actor> MethodTable<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method. A method registered twice keeps the last invoker.
    pub fn method<M>(mut self) -> Self
    where
        M: Method<Contract = A::Contract>,
        A: Handler<M>,
    {
        self.methods.insert(M::NAME, invoke::<A, M>);
        self
    }

    pub(crate) fn get(&self, name: &str) -> Option<Invoker<A>> {
        self.methods.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered method names.
    pub fn names(&self) -> Vec<&'static str> {
        self.methods.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CounterContract;

    impl Contract for CounterContract {
        const NAME: &'static str = "Counter";
    }

    struct Counter;

    impl Actor for Counter {
        type Contract = CounterContract;
        type Message = ();

        fn create(_actor_id: &str) -> Self {
            Counter
        }
    }

    struct Add;

    impl Method for Add {
        type Contract = CounterContract;
        type Args = (u64, u64);
        type Reply = u64;
        const NAME: &'static str = "add";
    }

    struct Negate;

    impl Method for Negate {
        type Contract = CounterContract;
        type Args = i64;
        type Reply = i64;
        const NAME: &'static str = "negate";
    }

    #[async_trait]
    impl Handler<Add> for Counter {
        async fn handle(
            &self,
            args: (u64, u64),
            _ctx: &ActorContext<Self>,
        ) -> Result<u64, Error> {
            Ok(args.0 + args.1)
        }
    }

    #[async_trait]
    impl Handler<Negate> for Counter {
        async fn handle(
            &self,
            args: i64,
            _ctx: &ActorContext<Self>,
        ) -> Result<i64, Error> {
            Ok(-args)
        }
    }

    #[test]
    fn test_method_table() {
        let table = MethodTable::<Counter>::new().method::<Add>().method::<Negate>();
        assert_eq!(table.len(), 2);
        assert!(table.contains("add"));
        assert!(table.contains("negate"));
        assert!(!table.contains("multiply"));
        assert!(table.get("add").is_some());

        let mut names = table.names();
        names.sort_unstable();
        assert_eq!(names, vec!["add", "negate"]);
    }
}
