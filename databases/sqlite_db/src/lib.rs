// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # SQLite claim store.
//!
//! This module contains the SQLite backend of the placement claim store. Every process of a
//! cluster running on the same host can open the same database file and coordinate through it.
//!

mod sqlite;

pub use sqlite::{SqliteClaimStore, open};
