//! Per-target outcomes and the run report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use stencil_core::{FileChangeSet, FileSnapshot, PullRequestResult};

use crate::error::SyncError;

/// Why a target needed no pull request, or could not be considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Target matches the template.
    NoDrift,
    /// Target entity is not in the catalog.
    EntityNotFound,
    /// No registered provider recognises the target.
    NoProvider,
    /// The provider found no usable repository URL on the target.
    NoRepositoryUrl,
    /// The run was cancelled before this target finished.
    Cancelled,
}

/// Pipeline step a target failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Resolve,
    Fetch,
    Submit,
    Timeout,
}

/// What a dry run would have submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub url: String,
    pub changes: FileChangeSet,
    /// Target content of the changed paths, for rendering diffs.
    #[serde(skip)]
    pub current: FileSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncResult {
    Created(PullRequestResult),
    Previewed(Preview),
    Skipped { reason: SkipReason },
    Failed { stage: FailureStage, message: String },
}

impl SyncResult {
    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn failed(stage: FailureStage, err: impl std::fmt::Display) -> Self {
        Self::Failed {
            stage,
            message: err.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Counts by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub created: usize,
    pub previewed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Everything one template run produced, keyed by target entity ref.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub template: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(
        serialize_with = "serialize_abort",
        skip_serializing_if = "Option::is_none"
    )]
    pub aborted: Option<SyncError>,
    pub results: BTreeMap<String, SyncResult>,
}

fn serialize_abort<S: Serializer>(abort: &Option<SyncError>, s: S) -> Result<S::Ok, S::Error> {
    match abort {
        Some(err) => s.serialize_str(&err.to_string()),
        None => s.serialize_none(),
    }
}

impl SyncReport {
    pub(crate) fn aborted(template: String, err: SyncError, started_at: DateTime<Utc>) -> Self {
        Self {
            template,
            started_at,
            finished_at: Utc::now(),
            aborted: Some(err),
            results: BTreeMap::new(),
        }
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for result in self.results.values() {
            match result {
                SyncResult::Created(_) => summary.created += 1,
                SyncResult::Previewed(_) => summary.previewed += 1,
                SyncResult::Skipped { .. } => summary.skipped += 1,
                SyncResult::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    /// No run-level abort and no failed target.
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && !self.results.values().any(SyncResult::is_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_serialize_with_status_tags() {
        let created = SyncResult::Created(PullRequestResult {
            number: 3,
            url: "https://github.com/acme/svc/pull/3".into(),
        });
        let json = serde_json::to_value(&created).unwrap();
        assert_eq!(json["status"], "created");
        assert_eq!(json["number"], 3);

        let skipped = serde_json::to_value(SyncResult::skipped(SkipReason::NoDrift)).unwrap();
        assert_eq!(skipped["status"], "skipped");
        assert_eq!(skipped["reason"], "no_drift");

        let failed =
            serde_json::to_value(SyncResult::failed(FailureStage::Fetch, "boom")).unwrap();
        assert_eq!(failed["stage"], "fetch");
        assert_eq!(failed["message"], "boom");
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut results = BTreeMap::new();
        results.insert("component:default/a".into(), SyncResult::skipped(SkipReason::NoDrift));
        results.insert(
            "component:default/b".into(),
            SyncResult::failed(FailureStage::Submit, "denied"),
        );
        let report = SyncReport {
            template: "template:default/t".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            aborted: None,
            results,
        };
        assert_eq!(
            report.summary(),
            Summary {
                skipped: 1,
                failed: 1,
                ..Summary::default()
            }
        );
        assert!(!report.is_success());
    }

    #[test]
    fn aborted_report_serializes_the_reason() {
        let report = SyncReport::aborted(
            "template:default/t".into(),
            SyncError::TemplateNotFound {
                template: "template:default/t".into(),
            },
            Utc::now(),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["aborted"].as_str().unwrap().contains("not found"));
        assert!(json["results"].as_object().unwrap().is_empty());
    }
}
