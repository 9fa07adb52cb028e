//! Memory record model and sharing policies.

use crate::{AgentId, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access rule attached to a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", tag = "type", content = "agents")]
pub enum SharingPolicy {
    /// Owner-only access.
    #[default]
    Private,
    /// Readable by every agent.
    Shared,
    /// Readable by members of the record's category or shared space.
    CategoryShared,
    /// Readable by the listed agents.
    Custom(Vec<AgentId>),
}

impl SharingPolicy {
    /// Build a custom policy, collapsing an empty allow list to `Private`.
    pub fn custom<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AgentId>,
    {
        SharingPolicy::Custom(agents.into_iter().map(Into::into).collect()).normalized()
    }

    /// Normalize the policy: empty custom lists become `Private`, duplicate
    /// and blank agent ids are removed.
    pub fn normalized(self) -> Self {
        match self {
            SharingPolicy::Custom(agents) => {
                let mut seen = Vec::with_capacity(agents.len());
                for agent in agents {
                    let agent = agent.trim().to_string();
                    if !agent.is_empty() && !seen.contains(&agent) {
                        seen.push(agent);
                    }
                }
                if seen.is_empty() {
                    SharingPolicy::Private
                } else {
                    SharingPolicy::Custom(seen)
                }
            }
            other => other,
        }
    }

    /// Short label used in logs and audit attributes.
    pub fn label(&self) -> &'static str {
        match self {
            SharingPolicy::Private => "private",
            SharingPolicy::Shared => "shared",
            SharingPolicy::CategoryShared => "category",
            SharingPolicy::Custom(_) => "custom",
        }
    }
}

impl fmt::Display for SharingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharingPolicy::Custom(agents) => write!(f, "custom:{}", agents.join(",")),
            other => f.write_str(other.label()),
        }
    }
}

impl FromStr for SharingPolicy {
    type Err = String;

    /// Parse `private`, `shared`, `category`, or `custom:a,b`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        match value {
            "private" => Ok(SharingPolicy::Private),
            "shared" => Ok(SharingPolicy::Shared),
            "category" | "category_shared" => Ok(SharingPolicy::CategoryShared),
            _ => {
                let Some(list) = value.strip_prefix("custom:") else {
                    return Err(format!("unknown sharing policy: {value}"));
                };
                Ok(SharingPolicy::custom(list.split(',')))
            }
        }
    }
}

/// Membership scope consulted for category-shared records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "type", content = "name")]
pub enum MembershipScope {
    /// Free-form category membership.
    Category(String),
    /// Named shared-space membership.
    Space(String),
}

impl fmt::Display for MembershipScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MembershipScope::Category(name) => write!(f, "category:{name}"),
            MembershipScope::Space(name) => write!(f, "space:{name}"),
        }
    }
}

/// Handle into the vector index, tied to the content it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingRef {
    /// Embedding model identifier.
    pub model: String,
    /// Hash of the normalized content the vector was computed from.
    pub content_hash: String,
}

/// Unit of shared state in the memory pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Agent that created the record.
    pub owner_agent_id: AgentId,
    /// Full text body.
    pub content: String,
    /// Short derived text used by index search.
    pub summary: String,
    /// Hash of the whitespace-normalized content.
    pub content_hash: String,
    /// Vector index handle, absent when embedding failed at write time.
    #[serde(default)]
    pub embedding_ref: Option<EmbeddingRef>,
    /// Free-form category, may be empty.
    #[serde(default)]
    pub category: String,
    /// Shared space the record was created in.
    #[serde(default)]
    pub space: Option<String>,
    /// Access rule for non-owners.
    #[serde(default)]
    pub sharing_policy: SharingPolicy,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last committed write.
    pub updated_at: DateTime<Utc>,
    /// Optional expiry used by external lifecycle processes.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    /// Whether the record has passed its expiry time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}
