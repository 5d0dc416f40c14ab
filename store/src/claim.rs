// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Claim store contract
//!
//! A claim is the distributed record that names the node owning a virtual actor. Claims live in
//! a linearizable key-value store and carry a TTL lease. Any backend able to run the two
//! operations below atomically satisfies the contract:
//!
//! - `try_claim`: if no live claim exists for the key, set it to the candidate and start the
//!   lease; otherwise return whoever already holds it.
//! - `extend_lease`: if the live claim still names the expected owner, restart the lease;
//!   otherwise fail without touching the record.
//!

use crate::error::Error;

use async_trait::async_trait;

use std::time::Duration;

/// Builds the claim key of an actor, `type:id`.
pub fn claim_key(actor_type: &str, actor_id: &str) -> String {
    format!("{}:{}", actor_type, actor_id)
}

/// Atomic compare-and-claim primitive with TTL.
#[async_trait]
pub trait ClaimStore: Send + Sync + 'static {
    /// Backend name, used in logs.
    fn name(&self) -> &str;

    /// Claims `key` for `candidate` unless a live claim exists.
    ///
    /// # Returns
    ///
    /// The owner recorded after the operation: the candidate if it won, the previous holder
    /// otherwise. Concurrent callers for the same key all observe the same owner.
    async fn try_claim(
        &self,
        key: &str,
        candidate: &str,
        ttl: Duration,
    ) -> Result<String, Error>;

    /// Restarts the lease of `key` if its live claim names `owner`.
    ///
    /// Returns `false`, leaving the record untouched, when the claim is missing, expired or held
    /// by another node.
    async fn extend_lease(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, Error>;

    /// Current live owner of `key`, if any.
    async fn owner(&self, key: &str) -> Result<Option<String>, Error>;
}

/// Rejects empty keys and owners before they reach a backend.
pub fn check_claim(key: &str, owner: &str) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::InvalidClaim("empty claim key".to_owned()));
    }
    if owner.is_empty() {
        return Err(Error::InvalidClaim(format!(
            "empty owner for claim {}",
            key
        )));
    }
    Ok(())
}

/// Shared behavior tests for every `ClaimStore` backend.
///
/// The expression is evaluated once per test and must yield the store under test.
#[macro_export]
macro_rules! test_claim_store {
    ($name:ident: $store:expr) => {
        #[cfg(test)]
        mod $name {
            use super::*;
            use $crate::claim::ClaimStore;
            use $crate::error::Error;
            use std::{sync::Arc, time::Duration};

            const TTL: Duration = Duration::from_secs(120);

            #[tokio::test]
            async fn test_claim_unclaimed_key() {
                let store = $store;
                let owner = store.try_claim("Echo:1", "node-a", TTL).await.unwrap();
                assert_eq!(owner, "node-a");
                assert_eq!(
                    store.owner("Echo:1").await.unwrap(),
                    Some("node-a".to_owned())
                );
            }

            #[tokio::test]
            async fn test_claim_keeps_first_owner() {
                let store = $store;
                store.try_claim("Echo:1", "node-a", TTL).await.unwrap();
                let owner = store.try_claim("Echo:1", "node-b", TTL).await.unwrap();
                assert_eq!(owner, "node-a");
            }

            #[tokio::test]
            async fn test_concurrent_claims_agree() {
                let store = Arc::new($store);
                let claims = (0..16).map(|n| {
                    let store = store.clone();
                    async move {
                        store
                            .try_claim("Player:42", &format!("node-{}", n), TTL)
                            .await
                            .unwrap()
                    }
                });
                let owners = futures::future::join_all(claims).await;
                let winner = owners[0].clone();
                assert!(owners.iter().all(|owner| *owner == winner));
                assert_eq!(store.owner("Player:42").await.unwrap(), Some(winner));
            }

            #[tokio::test]
            async fn test_two_nodes_race_for_player() {
                let store = Arc::new($store);
                let (first, second) = tokio::join!(
                    store.try_claim("Player:42", "node-1", TTL),
                    store.try_claim("Player:42", "node-2", TTL)
                );
                assert_eq!(first.unwrap(), second.unwrap());
            }

            #[tokio::test]
            async fn test_extend_lease_fencing() {
                let store = $store;
                store.try_claim("Echo:7", "node-a", TTL).await.unwrap();
                assert!(!store.extend_lease("Echo:7", "node-b", TTL).await.unwrap());
                assert_eq!(
                    store.owner("Echo:7").await.unwrap(),
                    Some("node-a".to_owned())
                );
                assert!(store.extend_lease("Echo:7", "node-a", TTL).await.unwrap());
            }

            #[tokio::test]
            async fn test_extend_missing_claim() {
                let store = $store;
                assert!(!store.extend_lease("Echo:8", "node-a", TTL).await.unwrap());
                assert_eq!(store.owner("Echo:8").await.unwrap(), None);
            }

            #[tokio::test]
            async fn test_invalid_claims() {
                let store = $store;
                assert!(matches!(
                    store.try_claim("", "node-a", TTL).await,
                    Err(Error::InvalidClaim(_))
                ));
                assert!(matches!(
                    store.try_claim("Echo:1", "", TTL).await,
                    Err(Error::InvalidClaim(_))
                ));
            }
        }
    };
}
