// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Claim store module.
//!
//! This module contains the distributed claim store used by the placement resolver to decide
//! which node owns a virtual actor, and an in-memory implementation of it.
//!

pub mod claim;
pub mod error;
pub mod memory;

pub use claim::{ClaimStore, check_claim, claim_key};
pub use error::Error;
pub use memory::MemoryClaimStore;
