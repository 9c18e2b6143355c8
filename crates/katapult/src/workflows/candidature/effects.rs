//! Side-effect dispatch around status transitions.
//!
//! Email, dossier generation, and CRM sync run after the core write has been
//! persisted, each under its own deadline. A failure or timeout is logged,
//! journaled for manual replay, and surfaced as a response warning. No effect
//! failure ever reaches the caller as an error.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::domain::{CandidatureId, CandidatureStatus};

/// The three effect channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Notification,
    Dossier,
    CrmSync,
}

impl EffectKind {
    pub const fn label(self) -> &'static str {
        match self {
            EffectKind::Notification => "notification",
            EffectKind::Dossier => "dossier",
            EffectKind::CrmSync => "crm_sync",
        }
    }
}

/// Non-fatal warning carried in the response next to the updated record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectWarning {
    pub effect: EffectKind,
    pub detail: String,
}

/// Result of one dispatched effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectOutcome {
    Completed,
    /// The effect did not apply to this transition.
    Skipped,
    Failed(EffectWarning),
}

impl EffectOutcome {
    pub fn warning(self) -> Option<EffectWarning> {
        match self {
            EffectOutcome::Failed(warning) => Some(warning),
            EffectOutcome::Completed | EffectOutcome::Skipped => None,
        }
    }
}

/// A journaled failure awaiting manual replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournaledFailure {
    pub candidature_id: CandidatureId,
    pub target_status: CandidatureStatus,
    pub effect: EffectKind,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

/// In-process journal of failed effects. Operators drain it to replay syncs
/// by hand; nothing in the engine retries automatically.
#[derive(Debug, Default)]
pub struct EffectJournal {
    entries: Mutex<Vec<JournaledFailure>>,
}

impl EffectJournal {
    pub fn record(&self, failure: JournaledFailure) {
        self.entries
            .lock()
            .expect("effect journal mutex poisoned")
            .push(failure);
    }

    pub fn entries(&self) -> Vec<JournaledFailure> {
        self.entries
            .lock()
            .expect("effect journal mutex poisoned")
            .clone()
    }

    pub fn drain(&self) -> Vec<JournaledFailure> {
        let mut entries = self
            .entries
            .lock()
            .expect("effect journal mutex poisoned");
        std::mem::take(&mut *entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .expect("effect journal mutex poisoned")
            .is_empty()
    }
}

/// Applies the deadline/log/journal policy to each dispatched effect.
pub struct SideEffects {
    timeout: Duration,
    journal: Arc<EffectJournal>,
}

impl SideEffects {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            journal: Arc::new(EffectJournal::default()),
        }
    }

    pub fn journal(&self) -> Arc<EffectJournal> {
        Arc::clone(&self.journal)
    }

    /// Runs one effect under the configured deadline. The outcome carries
    /// the warning on failure; the payload is the effect's result when it
    /// completed.
    pub async fn run<T, E, F>(
        &self,
        candidature_id: CandidatureId,
        target_status: CandidatureStatus,
        kind: EffectKind,
        task: F,
    ) -> (EffectOutcome, Option<T>)
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(value)) => (EffectOutcome::Completed, Some(value)),
            Ok(Err(err)) => (
                self.record_failure(candidature_id, target_status, kind, err.to_string()),
                None,
            ),
            Err(_) => (
                self.record_failure(
                    candidature_id,
                    target_status,
                    kind,
                    format!("timed out after {:?}", self.timeout),
                ),
                None,
            ),
        }
    }

    fn record_failure(
        &self,
        candidature_id: CandidatureId,
        target_status: CandidatureStatus,
        kind: EffectKind,
        detail: String,
    ) -> EffectOutcome {
        warn!(
            candidature = %candidature_id,
            effect = kind.label(),
            status = target_status.label(),
            error = %detail,
            "side effect failed"
        );

        self.journal.record(JournaledFailure {
            candidature_id,
            target_status,
            effect: kind,
            detail: detail.clone(),
            occurred_at: Utc::now(),
        });

        EffectOutcome::Failed(EffectWarning {
            effect: kind,
            detail,
        })
    }
}
