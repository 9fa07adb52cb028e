//! Deduplication verdicts.

use crate::RecordId;
use serde::{Deserialize, Serialize};

/// Classification of a candidate against existing records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    Exact,
    Near,
    Related,
    Distinct,
}

/// Action the caller is advised to take.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Do not store the candidate.
    Skip,
    /// Fold the candidate into the matched record.
    Merge,
    /// Store the candidate as a new record.
    KeepBoth,
}

/// Transient result of a deduplication check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicateVerdict {
    pub kind: DuplicateKind,
    /// Similarity score in `[0, 1]`.
    pub score: f32,
    /// Closest existing record, when one was found.
    pub matched_record_id: Option<RecordId>,
    pub recommended_action: RecommendedAction,
    /// Record the verdict is about, set by batch compaction.
    #[serde(default)]
    pub subject_record_id: Option<RecordId>,
    /// Set when the verdict was computed without the vector index.
    #[serde(default)]
    pub degraded: bool,
}

impl DuplicateVerdict {
    /// Identical content already stored by the same owner.
    pub fn exact(matched_record_id: RecordId) -> Self {
        Self {
            kind: DuplicateKind::Exact,
            score: 1.0,
            matched_record_id: Some(matched_record_id),
            recommended_action: RecommendedAction::Skip,
            subject_record_id: None,
            degraded: false,
        }
    }

    /// No duplicate found; `degraded` marks an exact-only evaluation.
    pub fn distinct(score: f32, matched_record_id: Option<RecordId>, degraded: bool) -> Self {
        Self {
            kind: DuplicateKind::Distinct,
            score: score.clamp(0.0, 1.0),
            matched_record_id,
            recommended_action: RecommendedAction::KeepBoth,
            subject_record_id: None,
            degraded,
        }
    }

    /// Attach the record the verdict is about.
    pub fn with_subject(mut self, subject_record_id: RecordId) -> Self {
        self.subject_record_id = Some(subject_record_id);
        self
    }

    /// Whether the verdict recommends storing the candidate.
    pub fn should_store(&self) -> bool {
        self.recommended_action == RecommendedAction::KeepBoth
    }
}
