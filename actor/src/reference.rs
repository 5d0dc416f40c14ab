// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor reference
//!
//! The stable logical address of a virtual actor: its type name plus its instance id. The
//! display form `type:id` doubles as the key of the distributed claim.
//!

use serde::{Deserialize, Serialize};

use std::fmt::{Display, Formatter};

/// Logical address of a virtual actor.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActorReference {
    actor_type: String,
    actor_id: String,
}

impl ActorReference {
    /// Creates a reference from its type name and instance id.
    pub fn new(actor_type: &str, actor_id: &str) -> Self {
        Self {
            actor_type: actor_type.to_owned(),
            actor_id: actor_id.to_owned(),
        }
    }

    /// Actor type (contract) name.
    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    /// Instance id.
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Key of the distributed claim for this actor.
    pub fn claim_key(&self) -> String {
        store::claim_key(&self.actor_type, &self.actor_id)
    }
}

impl Display for ActorReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.actor_type, self.actor_id)
    }
}

impl From<(&str, &str)> for ActorReference {
    fn from((actor_type, actor_id): (&str, &str)) -> Self {
        Self::new(actor_type, actor_id)
    }
}
