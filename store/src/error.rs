// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Claim store error types
//!
//! Errors raised by claim store backends. They are serializable so they can be carried inside
//! actor runtime errors and reported across nodes.
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for claim store backends.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq)]
pub enum Error {
    /// The backend could not be opened or initialized.
    #[error("Can't create store: {0}")]
    CreateStore(String),

    /// A claim operation received an invalid key, owner or lease.
    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    /// The backend failed while executing an operation.
    #[error("Store error: {0}")]
    Store(String),
}
