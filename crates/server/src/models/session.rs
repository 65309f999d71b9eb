//! Session-related types.
//!
//! The acting user is established by the surrounding authentication system
//! and stored in the session; this service only reads it.

use serde::{Deserialize, Serialize};

use warehub_core::UserId;

/// Session-stored identity of the user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User's ID.
    pub user_id: UserId,
    /// Administrative override: sees every listing unmasked, never charged.
    #[serde(default)]
    pub privileged: bool,
}

impl Actor {
    /// A regular user.
    #[must_use]
    pub const fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            privileged: false,
        }
    }

    /// An administrator.
    #[must_use]
    pub const fn privileged(user_id: UserId) -> Self {
        Self {
            user_id,
            privileged: true,
        }
    }
}

/// Session keys.
pub mod keys {
    /// Key for the acting user.
    pub const CURRENT_ACTOR: &str = "current_actor";
}
