// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Outstanding remote calls, keyed by request id.

use crate::rpc::message::RpcResponse;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use std::{collections::HashMap, sync::Arc};

/// Response plus its body.
pub type Reply = (RpcResponse, Vec<u8>);

/// Table correlating responses with the calls waiting for them.
#[derive(Clone, Default)]
pub struct PendingCalls {
    calls: Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call and returns the future of its response.
    pub fn register(&self, request_id: u64) -> oneshot::Receiver<Reply> {
        let (sender, receiver) = oneshot::channel();
        self.calls.lock().insert(request_id, sender);
        receiver
    }

    /// Completes the call matching the response. Returns `false` if nobody waits for it
    /// (late response after a timeout, or unknown id).
    pub fn complete(&self, response: RpcResponse, body: Vec<u8>) -> bool {
        let sender = self.calls.lock().remove(&response.request_id);
        match sender {
            Some(sender) => sender.send((response, body)).is_ok(),
            None => {
                debug!(
                    "No pending call for response {}.",
                    response.request_id
                );
                false
            }
        }
    }

    /// Forgets a call, typically after its deadline.
    pub fn cancel(&self, request_id: u64) {
        self.calls.lock().remove(&request_id);
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}
