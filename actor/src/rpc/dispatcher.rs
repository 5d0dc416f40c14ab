// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Routes inbound envelopes to actors, pending calls and heartbeats.
//!
//! Gateway notifications go to the actor they name: session binding, session abort and the
//! client messages the gateway forwards.

use crate::{
    ActorReference, Error, NodeRef,
    mailbox::{InboundRequest, ReplyTo},
    rpc::{
        Envelope, Metadata, PendingCalls, ResponseHeartBeat, RpcRequest,
        RpcResponse,
    },
    session::SessionId,
};

use tracing::{debug, error, warn};

/// Inbound side of the RPC layer.
#[derive(Clone, Default)]
pub struct Dispatcher {
    pending: PendingCalls,
}

impl Dispatcher {
    pub fn new(pending: PendingCalls) -> Self {
        Self { pending }
    }

    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    /// Routes one envelope received on `session`.
    pub async fn route(
        &self,
        node: &NodeRef,
        session: SessionId,
        envelope: Envelope,
    ) {
        let Envelope { meta, body } = envelope;
        match meta {
            Metadata::Request(request) => {
                self.dispatch(node, ReplyTo::Session(session), request, body)
                    .await
            }
            Metadata::Response(response) => {
                self.pending.complete(response, body);
            }
            Metadata::RequestHeartBeat(heartbeat) => {
                let answer = Envelope::meta(ResponseHeartBeat {
                    now_sec: heartbeat.now_sec,
                });
                match node.sessions().get(session) {
                    Some(peer) => {
                        if let Err(e) = peer.send(answer).await {
                            error!("Can not answer heart beat: {}", e);
                        }
                    }
                    None => debug!("Heart beat from closed session {}.", session),
                }
            }
            Metadata::ResponseHeartBeat(heartbeat) => {
                debug!(
                    "Heart beat answered on session {} ({}).",
                    session, heartbeat.now_sec
                );
            }
            Metadata::NotifyNewActorSession(notify) => {
                let reference =
                    ActorReference::new(&notify.actor_type, &notify.actor_id);
                match node.get_or_create(&reference) {
                    Ok(actor) => actor.bind_session(notify.session_id),
                    Err(e) => error!("Can not bind session to {}: {}", reference, e),
                }
            }
            Metadata::NotifyActorSessionAborted(notify) => {
                let reference =
                    ActorReference::new(&notify.actor_type, &notify.actor_id);
                if let Some(actor) = node.directory().get(&reference) {
                    actor.abort_session(notify.session_id);
                }
            }
            Metadata::NotifyNewActorMessage(notify) => {
                let reference =
                    ActorReference::new(&notify.actor_type, &notify.actor_id);
                match node.get_or_create(&reference) {
                    Ok(actor) => actor.deliver(notify.session_id, body),
                    Err(e) => error!("Can not deliver message to {}: {}", reference, e),
                }
            }
        }
    }

    /// Hands a request to its actor, or answers it with an error.
    pub(crate) async fn dispatch(
        &self,
        node: &NodeRef,
        reply_to: ReplyTo,
        request: RpcRequest,
        body: Vec<u8>,
    ) {
        let reference = ActorReference::new(&request.server_name, &request.actor_id);
        if !request.server_id.is_empty() && request.server_id != node.server_id() {
            debug!(
                "Request {} for {} targets {}, not {}.",
                request.request_id,
                reference,
                request.server_id,
                node.server_id()
            );
            let error = Error::PositionChanged(reference.to_string());
            self.reply(node, reply_to, RpcResponse::error(request.request_id, &error), Vec::new())
                .await;
            return;
        }
        if request.server_id == node.server_id() {
            node.resolver()
                .record_local(&request.server_name, &request.actor_id);
        }

        match node.get_or_create(&reference) {
            Ok(actor) => {
                actor
                    .enqueue_request(InboundRequest {
                        reply_to,
                        request,
                        body,
                    })
                    .await
            }
            Err(e) => {
                error!("Request {} for {} failed: {}", request.request_id, reference, e);
                self.reply(node, reply_to, RpcResponse::error(request.request_id, &e), Vec::new())
                    .await;
            }
        }
    }

    /// Sends a response back to the caller.
    ///
    /// Through a session the response is only sent if the session is still registered and open.
    pub(crate) async fn reply(
        &self,
        node: &NodeRef,
        reply_to: ReplyTo,
        response: RpcResponse,
        body: Vec<u8>,
    ) {
        match reply_to {
            ReplyTo::Local => {
                self.pending.complete(response, body);
            }
            ReplyTo::Session(session_id) => match node.sessions().get(session_id) {
                Some(session) => {
                    let request_id = response.request_id;
                    if let Err(e) = session.send(Envelope::new(response, body)).await {
                        warn!("Response {} dropped: {}", request_id, e);
                    }
                }
                None => warn!(
                    "Response {} dropped, session {} is gone.",
                    response.request_id, session_id
                ),
            },
        }
    }
}
