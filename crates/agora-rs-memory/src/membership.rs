//! Category and shared-space membership.

use crate::error::StoreError;
use agora_rs_protocol::{AgentId, MembershipScope};
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

#[async_trait]
/// Answers whether an agent belongs to a category or shared space.
pub trait MembershipSource: Send + Sync {
    async fn is_member(&self, agent_id: &str, scope: &MembershipScope)
    -> Result<bool, StoreError>;
}

/// Membership directory held in memory.
///
/// Categories are open groups that agents join freely. Spaces must be created
/// before members can be added.
#[derive(Debug, Default)]
pub struct InMemoryMembership {
    groups: RwLock<HashMap<MembershipScope, BTreeSet<AgentId>>>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the agent to a category.
    pub fn join_category(&self, category: &str, agent_id: &str) {
        self.groups
            .write()
            .entry(MembershipScope::Category(category.to_string()))
            .or_default()
            .insert(agent_id.to_string());
        debug!("joined category (category={category}, agent_id={agent_id})");
    }

    /// Remove the agent from a category; returns whether it was a member.
    pub fn leave_category(&self, category: &str, agent_id: &str) -> bool {
        self.groups
            .write()
            .get_mut(&MembershipScope::Category(category.to_string()))
            .is_some_and(|members| members.remove(agent_id))
    }

    /// Create a shared space with initial members; returns false if it exists.
    pub fn create_space<I, S>(&self, space: &str, members: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<AgentId>,
    {
        let key = MembershipScope::Space(space.to_string());
        let mut groups = self.groups.write();
        if groups.contains_key(&key) {
            return false;
        }
        let members: BTreeSet<AgentId> = members.into_iter().map(Into::into).collect();
        info!(
            "created shared space (space={space}, members={})",
            members.len()
        );
        groups.insert(key, members);
        true
    }

    /// Add an agent to an existing space; returns false if the space is unknown.
    pub fn add_space_member(&self, space: &str, agent_id: &str) -> bool {
        let mut groups = self.groups.write();
        let Some(members) = groups.get_mut(&MembershipScope::Space(space.to_string())) else {
            return false;
        };
        members.insert(agent_id.to_string());
        true
    }

    /// Remove an agent from a space; returns whether it was a member.
    pub fn remove_space_member(&self, space: &str, agent_id: &str) -> bool {
        self.groups
            .write()
            .get_mut(&MembershipScope::Space(space.to_string()))
            .is_some_and(|members| members.remove(agent_id))
    }

    /// Members of a space in sorted order, or `None` if it does not exist.
    pub fn space_members(&self, space: &str) -> Option<Vec<AgentId>> {
        self.groups
            .read()
            .get(&MembershipScope::Space(space.to_string()))
            .map(|members| members.iter().cloned().collect())
    }
}

#[async_trait]
impl MembershipSource for InMemoryMembership {
    async fn is_member(
        &self,
        agent_id: &str,
        scope: &MembershipScope,
    ) -> Result<bool, StoreError> {
        Ok(self
            .groups
            .read()
            .get(scope)
            .is_some_and(|members| members.contains(agent_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn category_membership_is_checked_per_scope() {
        let directory = InMemoryMembership::new();
        directory.join_category("design", "x");
        let design = MembershipScope::Category("design".to_string());
        let ops = MembershipScope::Category("ops".to_string());
        assert!(directory.is_member("x", &design).await.expect("lookup"));
        assert!(!directory.is_member("y", &design).await.expect("lookup"));
        assert!(!directory.is_member("x", &ops).await.expect("lookup"));
        assert!(directory.leave_category("design", "x"));
        assert!(!directory.is_member("x", &design).await.expect("lookup"));
    }

    #[tokio::test]
    async fn spaces_must_exist_before_members_are_added() {
        let directory = InMemoryMembership::new();
        assert!(!directory.add_space_member("war-room", "a"));
        assert!(directory.create_space("war-room", ["b", "a"]));
        assert!(!directory.create_space("war-room", ["c"]));
        assert!(directory.add_space_member("war-room", "c"));
        assert_eq!(
            directory.space_members("war-room"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert!(directory.remove_space_member("war-room", "b"));
        let space = MembershipScope::Space("war-room".to_string());
        assert!(!directory.is_member("b", &space).await.expect("lookup"));
        assert_eq!(directory.space_members("missing"), None);
    }
}
