//! Access capabilities and decisions.

use serde::{Deserialize, Serialize};

/// Capability requested on a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read content.
    Read,
    /// Update content or sharing.
    Write,
    /// Remove the record.
    Delete,
}

/// Reason attached to an access decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    /// Requester owns the record.
    Owner,
    /// Record is shared with every agent.
    SharedRead,
    /// Requester belongs to the record's category.
    CategoryMember,
    /// Requester belongs to the record's shared space.
    SpaceMember,
    /// Requester is on the record's allow list.
    AllowListed,
    /// Mutation requested by a non-owner.
    NotOwner,
    /// Record is private to its owner.
    PolicyDenied,
    /// Requester is not a member of the record's category or space.
    CategoryMismatch,
    /// Requester is not on the record's allow list.
    NotInAllowList,
}

/// Result of an access evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether access is permitted.
    pub allowed: bool,
    /// Why the decision was reached.
    pub reason: AccessReason,
}

impl AccessDecision {
    /// Allowed decision with the given reason.
    pub fn allow(reason: AccessReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    /// Denied decision with the given reason.
    pub fn deny(reason: AccessReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}
