use agora_rs_memory::{InMemoryMembership, MembershipSource, StoreError};
use agora_rs_protocol::MembershipScope;
use async_trait::async_trait;
use std::sync::Arc;

/// Membership source that is always unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingMembership;

#[async_trait]
impl MembershipSource for FailingMembership {
    async fn is_member(
        &self,
        _agent_id: &str,
        _scope: &MembershipScope,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("membership offline".to_string()))
    }
}

/// Directory whose lookups fail for one agent and are answered normally for
/// everyone else.
pub struct UnreachableFor {
    agent_id: String,
    directory: Arc<InMemoryMembership>,
}

impl UnreachableFor {
    pub fn new(agent_id: impl Into<String>, directory: Arc<InMemoryMembership>) -> Self {
        Self {
            agent_id: agent_id.into(),
            directory,
        }
    }
}

#[async_trait]
impl MembershipSource for UnreachableFor {
    async fn is_member(&self, agent_id: &str, scope: &MembershipScope) -> Result<bool, StoreError> {
        if agent_id == self.agent_id {
            return Err(StoreError::Unavailable(format!(
                "membership shard for {agent_id} offline"
            )));
        }
        self.directory.is_member(agent_id, scope).await
    }
}
