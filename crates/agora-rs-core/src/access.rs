//! Access-control evaluation for records and events.
//!
//! [`evaluate`] is the whole rule set as a pure function; the
//! [`AccessEvaluator`] only adds the membership lookup that category-shared
//! records need.

use crate::error::CoreError;
use agora_rs_memory::MembershipSource;
use agora_rs_protocol::{
    AccessDecision, AccessReason, Capability, MembershipScope, MemoryRecord, SharingPolicy,
    SyncEvent,
};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// The fields of a record that access rules depend on.
#[derive(Debug, Clone, Copy)]
pub struct AccessTarget<'a> {
    pub owner_agent_id: &'a str,
    pub category: &'a str,
    pub space: Option<&'a str>,
    pub sharing_policy: &'a SharingPolicy,
}

impl AccessTarget<'_> {
    /// Membership consulted for category-shared access: the space when the
    /// record lives in one, otherwise its non-empty category.
    pub fn membership_scope(&self) -> Option<MembershipScope> {
        match self.space {
            Some(space) => Some(MembershipScope::Space(space.to_string())),
            None if self.category.trim().is_empty() => None,
            None => Some(MembershipScope::Category(self.category.to_string())),
        }
    }
}

impl<'a> From<&'a MemoryRecord> for AccessTarget<'a> {
    fn from(record: &'a MemoryRecord) -> Self {
        Self {
            owner_agent_id: &record.owner_agent_id,
            category: &record.category,
            space: record.space.as_deref(),
            sharing_policy: &record.sharing_policy,
        }
    }
}

/// Events carry the record's policy at the time of the transition, so a
/// deleted record is judged by the policy it had when it was deleted.
impl<'a> From<&'a SyncEvent> for AccessTarget<'a> {
    fn from(event: &'a SyncEvent) -> Self {
        Self {
            owner_agent_id: &event.owner_agent_id,
            category: &event.category,
            space: event.space.as_deref(),
            sharing_policy: &event.sharing_policy,
        }
    }
}

/// Membership scope that must be looked up before [`evaluate`] can decide,
/// or `None` when the decision does not depend on membership.
pub fn membership_query(
    target: &AccessTarget<'_>,
    agent_id: &str,
    capability: Capability,
) -> Option<MembershipScope> {
    let needs_lookup = target.owner_agent_id != agent_id
        && capability == Capability::Read
        && *target.sharing_policy == SharingPolicy::CategoryShared;
    if needs_lookup {
        target.membership_scope()
    } else {
        None
    }
}

/// Decide access. The first matching rule wins:
///
/// 1. the owner may do anything;
/// 2. only the owner may write or delete;
/// 3. private records (and empty allow lists) are owner-only;
/// 4. shared records are readable by everyone;
/// 5. category-shared records are readable by members of the record's space,
///    or of its category when it has no space;
/// 6. custom records are readable by the listed agents.
///
/// `is_member` is the answer for the scope returned by [`membership_query`]
/// and is ignored otherwise.
pub fn evaluate(
    target: &AccessTarget<'_>,
    agent_id: &str,
    capability: Capability,
    is_member: bool,
) -> AccessDecision {
    if target.owner_agent_id == agent_id {
        return AccessDecision::allow(AccessReason::Owner);
    }
    if capability != Capability::Read {
        return AccessDecision::deny(AccessReason::NotOwner);
    }
    match target.sharing_policy {
        SharingPolicy::Private => AccessDecision::deny(AccessReason::PolicyDenied),
        SharingPolicy::Custom(agents) if agents.is_empty() => {
            AccessDecision::deny(AccessReason::PolicyDenied)
        }
        SharingPolicy::Shared => AccessDecision::allow(AccessReason::SharedRead),
        SharingPolicy::CategoryShared => match target.membership_scope() {
            Some(MembershipScope::Space(_)) if is_member => {
                AccessDecision::allow(AccessReason::SpaceMember)
            }
            Some(MembershipScope::Category(_)) if is_member => {
                AccessDecision::allow(AccessReason::CategoryMember)
            }
            _ => AccessDecision::deny(AccessReason::CategoryMismatch),
        },
        SharingPolicy::Custom(agents) => {
            if agents.iter().any(|agent| agent == agent_id) {
                AccessDecision::allow(AccessReason::AllowListed)
            } else {
                AccessDecision::deny(AccessReason::NotInAllowList)
            }
        }
    }
}

/// Evaluates access against a membership source.
#[derive(Clone)]
pub struct AccessEvaluator {
    membership: Arc<dyn MembershipSource>,
}

impl AccessEvaluator {
    pub fn new(membership: Arc<dyn MembershipSource>) -> Self {
        Self { membership }
    }

    /// Decide whether `agent_id` holds `capability` on the target.
    ///
    /// A failed membership lookup fails the call; access is never guessed.
    pub async fn can_access(
        &self,
        target: AccessTarget<'_>,
        agent_id: &str,
        capability: Capability,
    ) -> Result<AccessDecision, CoreError> {
        let is_member = match membership_query(&target, agent_id, capability) {
            Some(scope) => self.is_member(agent_id, &scope).await?,
            None => false,
        };
        let decision = evaluate(&target, agent_id, capability, is_member);
        debug!(
            "access evaluated (agent_id={}, capability={:?}, allowed={}, reason={:?})",
            agent_id, capability, decision.allowed, decision.reason
        );
        Ok(decision)
    }

    /// Membership lookup with store failures mapped to `StoreUnavailable`.
    pub async fn is_member(
        &self,
        agent_id: &str,
        scope: &MembershipScope,
    ) -> Result<bool, CoreError> {
        self.membership
            .is_member(agent_id, scope)
            .await
            .map_err(|err| CoreError::StoreUnavailable(format!("membership lookup failed: {err}")))
    }

    /// Read checker for one agent that remembers membership answers, for
    /// filtering many records in a single call.
    pub fn reader<'a>(&'a self, agent_id: &'a str) -> ReadCheck<'a> {
        ReadCheck {
            evaluator: self,
            agent_id,
            memberships: HashMap::new(),
        }
    }
}

/// Read filter bound to one agent; see [`AccessEvaluator::reader`].
pub struct ReadCheck<'a> {
    evaluator: &'a AccessEvaluator,
    agent_id: &'a str,
    memberships: HashMap<MembershipScope, bool>,
}

impl ReadCheck<'_> {
    /// Whether the agent may read the target.
    pub async fn allows(&mut self, target: AccessTarget<'_>) -> Result<bool, CoreError> {
        let is_member = match membership_query(&target, self.agent_id, Capability::Read) {
            Some(scope) => match self.memberships.get(&scope) {
                Some(known) => *known,
                None => {
                    let answer = self.evaluator.is_member(self.agent_id, &scope).await?;
                    self.memberships.insert(scope, answer);
                    answer
                }
            },
            None => false,
        };
        Ok(evaluate(&target, self.agent_id, Capability::Read, is_member).allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target<'a>(
        policy: &'a SharingPolicy,
        category: &'a str,
        space: Option<&'a str>,
    ) -> AccessTarget<'a> {
        AccessTarget {
            owner_agent_id: "owner",
            category,
            space,
            sharing_policy: policy,
        }
    }

    #[test]
    fn owner_holds_every_capability() {
        let policy = SharingPolicy::Private;
        let target = target(&policy, "", None);
        for capability in [Capability::Read, Capability::Write, Capability::Delete] {
            assert_eq!(
                evaluate(&target, "owner", capability, false),
                AccessDecision::allow(AccessReason::Owner)
            );
        }
    }

    #[test]
    fn sharing_never_delegates_mutation() {
        let policy = SharingPolicy::Shared;
        let target = target(&policy, "", None);
        assert_eq!(
            evaluate(&target, "other", Capability::Write, true),
            AccessDecision::deny(AccessReason::NotOwner)
        );
        assert_eq!(
            evaluate(&target, "other", Capability::Delete, true),
            AccessDecision::deny(AccessReason::NotOwner)
        );
    }

    #[test]
    fn private_and_empty_custom_are_owner_only() {
        for policy in [SharingPolicy::Private, SharingPolicy::Custom(Vec::new())] {
            let target = target(&policy, "", None);
            assert_eq!(
                evaluate(&target, "other", Capability::Read, true),
                AccessDecision::deny(AccessReason::PolicyDenied)
            );
        }
    }

    #[test]
    fn custom_list_gates_reads() {
        let policy = SharingPolicy::custom(["a", "b"]);
        let target = target(&policy, "", None);
        assert_eq!(
            evaluate(&target, "a", Capability::Read, false),
            AccessDecision::allow(AccessReason::AllowListed)
        );
        assert_eq!(
            evaluate(&target, "c", Capability::Read, false),
            AccessDecision::deny(AccessReason::NotInAllowList)
        );
        assert_eq!(
            evaluate(&target, "a", Capability::Write, false),
            AccessDecision::deny(AccessReason::NotOwner)
        );
    }

    #[test]
    fn category_shared_depends_on_membership() {
        let policy = SharingPolicy::CategoryShared;
        let in_category = target(&policy, "design", None);
        assert_eq!(
            evaluate(&in_category, "x", Capability::Read, true),
            AccessDecision::allow(AccessReason::CategoryMember)
        );
        assert_eq!(
            evaluate(&in_category, "y", Capability::Read, false),
            AccessDecision::deny(AccessReason::CategoryMismatch)
        );

        let in_space = target(&policy, "design", Some("war-room"));
        assert_eq!(
            evaluate(&in_space, "x", Capability::Read, true),
            AccessDecision::allow(AccessReason::SpaceMember)
        );

        let uncategorized = target(&policy, " ", None);
        assert_eq!(
            evaluate(&uncategorized, "x", Capability::Read, true),
            AccessDecision::deny(AccessReason::CategoryMismatch)
        );
    }

    #[test]
    fn membership_is_only_queried_when_needed() {
        let category_shared = SharingPolicy::CategoryShared;
        let shared = SharingPolicy::Shared;
        let design = target(&category_shared, "design", None);
        assert_eq!(
            membership_query(&design, "x", Capability::Read),
            Some(MembershipScope::Category("design".to_string()))
        );
        assert_eq!(membership_query(&design, "owner", Capability::Read), None);
        assert_eq!(membership_query(&design, "x", Capability::Write), None);
        assert_eq!(
            membership_query(&target(&shared, "design", None), "x", Capability::Read),
            None
        );
        assert_eq!(
            membership_query(
                &target(&category_shared, "design", Some("ops")),
                "x",
                Capability::Read
            ),
            Some(MembershipScope::Space("ops".to_string()))
        );
    }
}
