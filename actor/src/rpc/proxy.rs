// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor proxy
//!
//! Typed outbound calls. A proxy resolves the owner of the actor through the placement
//! resolver, sends the request (in-process when the owner is the local node) and waits for the
//! response with the configured timeout. A `PositionChanged` answer evicts the cached placement
//! and the call is retried, up to `rpc_attempts` attempts. A missing method comes back as
//! [`Error::MethodNotFound`] naming the called actor.
//!

use crate::{
    Error, NodeRef,
    actor::Contract,
    handler::Method,
    mailbox::ReplyTo,
    membership::ServerNode,
    rpc::{Envelope, RpcErrorCode, RpcRequest, payload},
};

use tracing::{debug, warn};

use std::{marker::PhantomData, sync::Arc};

/// Proxy to one actor of contract `C`.
pub struct ActorProxy<C: Contract> {
    node: NodeRef,
    actor_id: String,
    reentrant_id: Option<u64>,
    server: Option<Arc<ServerNode>>,
    check_position: bool,
    _contract: PhantomData<fn() -> C>,
}

impl<C: Contract> Clone for ActorProxy<C> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            actor_id: self.actor_id.clone(),
            reentrant_id: self.reentrant_id,
            server: self.server.clone(),
            check_position: self.check_position,
            _contract: PhantomData,
        }
    }
}

impl<C: Contract> ActorProxy<C> {
    pub(crate) fn new(node: NodeRef, actor_id: &str) -> Self {
        Self {
            node,
            actor_id: actor_id.to_owned(),
            reentrant_id: None,
            server: None,
            check_position: true,
            _contract: PhantomData,
        }
    }

    /// Carries a call chain token. Zero means no chain.
    pub(crate) fn with_reentrant_id(mut self, reentrant_id: u64) -> Self {
        self.reentrant_id = (reentrant_id != 0).then_some(reentrant_id);
        self
    }

    /// Pins the proxy to a server, skipping placement.
    pub fn with_server(mut self, server: Arc<ServerNode>) -> Self {
        self.server = Some(server);
        self
    }

    /// With `false` the request carries no server id and the receiver serves it whatever its
    /// placement says.
    pub fn check_position(mut self, check: bool) -> Self {
        self.check_position = check;
        self
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Calls method `M` with `args`.
    pub async fn call<M>(&self, args: &M::Args) -> Result<M::Reply, Error>
    where
        M: Method<Contract = C>,
    {
        let config = self.node.config();
        let body = payload::encode(args, config.compress_threshold)?;
        let reentrant_id = self
            .reentrant_id
            .unwrap_or_else(|| self.node.next_request_id());
        let mut retry = config.retry_strategy();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt(M::NAME, reentrant_id, body.clone()).await {
                Ok(reply) => return payload::decode(&reply),
                Err(Error::PositionChanged(message))
                    if attempt <= retry.max_retries() =>
                {
                    debug!(
                        "{}:{} moved ({}), attempt {} of {}.",
                        C::NAME,
                        self.actor_id,
                        message,
                        attempt,
                        retry.max_retries() + 1
                    );
                    self.node.resolver().remove_position(C::NAME, &self.actor_id);
                    if let Some(wait) = retry.next_backoff() {
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn owner(&self) -> Result<Arc<ServerNode>, Error> {
        if let Some(server) = &self.server {
            return Ok(server.clone());
        }
        self.node
            .resolver()
            .find_position(C::NAME, &self.actor_id)
            .await?
            .ok_or_else(|| Error::PositionNotFound(format!("{}:{}", C::NAME, self.actor_id)))
    }

    async fn attempt(
        &self,
        method: &str,
        reentrant_id: u64,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, Error> {
        let owner = self.owner().await?;
        let request = RpcRequest {
            server_name: C::NAME.to_owned(),
            method_name: method.to_owned(),
            actor_id: self.actor_id.clone(),
            reentrant_id,
            request_id: self.node.next_request_id(),
            server_id: if self.check_position {
                owner.server_id().to_owned()
            } else {
                String::new()
            },
        };
        let request_id = request.request_id;
        let pending = self.node.pending();
        let receiver = pending.register(request_id);

        if owner.server_id() == self.node.server_id() {
            self.node
                .dispatcher()
                .dispatch(&self.node, ReplyTo::Local, request, body)
                .await;
        } else {
            let sent = match self.node.resolver().ensure_session(&self.node, &owner).await {
                Ok(session) => session.send(Envelope::new(request, body)).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                pending.cancel(request_id);
                return Err(e);
            }
        }

        let timeout = self.node.config().rpc_timeout();
        let (response, reply) = match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(Error::Send(format!(
                    "call {} to {}:{} abandoned",
                    request_id,
                    C::NAME,
                    self.actor_id
                )));
            }
            Err(_) => {
                pending.cancel(request_id);
                warn!(
                    "Call {} to {}:{}.{} timed out after {:?}.",
                    request_id,
                    C::NAME,
                    self.actor_id,
                    method,
                    timeout
                );
                return Err(Error::Timeout(format!(
                    "{}:{}.{}",
                    C::NAME,
                    self.actor_id,
                    method
                )));
            }
        };

        if response.is_ok() {
            Ok(reply)
        } else if response.error_code == RpcErrorCode::MethodNotFound.as_i32() {
            Err(Error::MethodNotFound {
                actor: format!("{}:{}", C::NAME, self.actor_id),
                method: method.to_owned(),
            })
        } else {
            Err(Error::from_response(response.error_code, &response.error_str))
        }
    }
}
