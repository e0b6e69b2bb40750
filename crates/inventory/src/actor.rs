use serde::{Deserialize, Serialize};

use stockledger_core::UserId;

/// The user on whose behalf an operation runs (creator, reviewer, approver).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub email: String,
}

impl Actor {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }
}
