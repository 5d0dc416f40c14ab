// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! In-memory claim store.
//!
//! Claims are kept in a single map guarded by a mutex, so every operation is trivially
//! linearizable inside one process. Leases are measured with the tokio clock, which lets tests
//! drive expiry with a paused runtime. Expired claims are evicted on the next claim.
//!

use crate::{
    claim::{ClaimStore, check_claim},
    error::Error,
};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

#[derive(Debug, Clone)]
struct Claim {
    owner: String,
    expires_at: Instant,
}

impl Claim {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

type MemoryData = Arc<Mutex<HashMap<String, Claim>>>;

/// Claim store living in the memory of one process.
///
/// Clones share the same data, so several nodes of an in-process cluster can coordinate through
/// one instance.
#[derive(Default, Clone)]
pub struct MemoryClaimStore {
    data: MemoryData,
}

impl MemoryClaimStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live claims.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .lock()
            .map(|data| data.values().filter(|claim| claim.is_live(now)).count())
            .unwrap_or_default()
    }

    /// True if no live claim exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn try_claim(
        &self,
        key: &str,
        candidate: &str,
        ttl: Duration,
    ) -> Result<String, Error> {
        check_claim(key, candidate)?;
        let mut data = self
            .data
            .lock()
            .map_err(|e| Error::Store(format!("Can not lock data: {}", e)))?;
        let now = Instant::now();
        let before = data.len();
        data.retain(|_, claim| claim.is_live(now));
        if data.len() < before {
            debug!("{} expired claims evicted.", before - data.len());
        }
        match data.get(key) {
            Some(claim) => Ok(claim.owner.clone()),
            None => {
                debug!("Claim {} taken by {}.", key, candidate);
                data.insert(
                    key.to_owned(),
                    Claim {
                        owner: candidate.to_owned(),
                        expires_at: now + ttl,
                    },
                );
                Ok(candidate.to_owned())
            }
        }
    }

    async fn extend_lease(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, Error> {
        check_claim(key, owner)?;
        let mut data = self
            .data
            .lock()
            .map_err(|e| Error::Store(format!("Can not lock data: {}", e)))?;
        let now = Instant::now();
        match data.get_mut(key) {
            Some(claim) if claim.is_live(now) && claim.owner == owner => {
                claim.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn owner(&self, key: &str) -> Result<Option<String>, Error> {
        let data = self
            .data
            .lock()
            .map_err(|e| Error::Store(format!("Can not lock data: {}", e)))?;
        let now = Instant::now();
        Ok(data
            .get(key)
            .filter(|claim| claim.is_live(now))
            .map(|claim| claim.owner.clone()))
    }
}
