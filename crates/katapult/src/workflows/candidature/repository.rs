use async_trait::async_trait;
use serde::Serialize;

use super::domain::{Candidature, CandidatureId, CandidatureStatus, UserId};
use super::evaluation::{Evaluation, EvaluationId};
use super::sections::CandidatureChanges;

/// Storage abstraction so the workflow can be exercised in isolation.
///
/// Identifiers and timestamps are assigned by the service layer; the
/// repository stores what it is given.
#[async_trait]
pub trait CandidatureRepository: Send + Sync {
    async fn insert(&self, candidature: Candidature) -> Result<Candidature, RepositoryError>;

    async fn fetch(&self, id: CandidatureId) -> Result<Option<Candidature>, RepositoryError>;

    /// Applies a change set to the stored record and returns the result.
    async fn update(
        &self,
        id: CandidatureId,
        changes: CandidatureChanges,
    ) -> Result<Candidature, RepositoryError>;

    /// Compare-and-set on status. Returns the updated record when the stored
    /// status still matched `from`, and `None` when it had already moved, so
    /// concurrent callers cannot double-fire a transition.
    async fn transition_status(
        &self,
        id: CandidatureId,
        from: CandidatureStatus,
        to: CandidatureStatus,
    ) -> Result<Option<Candidature>, RepositoryError>;

    /// The caller's non-rejected candidature, if one exists.
    async fn find_active_for(
        &self,
        user_id: UserId,
    ) -> Result<Option<Candidature>, RepositoryError>;

    async fn count_by_status(&self, status: CandidatureStatus) -> Result<u64, RepositoryError>;

    async fn insert_evaluation(
        &self,
        evaluation: Evaluation,
    ) -> Result<Evaluation, RepositoryError>;

    async fn evaluations_for(
        &self,
        candidature_id: CandidatureId,
    ) -> Result<Vec<Evaluation>, RepositoryError>;

    async fn find_evaluation(
        &self,
        candidature_id: CandidatureId,
        evaluator_id: UserId,
    ) -> Result<Option<Evaluation>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Dashboard counts projected over the candidature collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CandidatureStatistics {
    pub total: u64,
    pub submitted: u64,
    pub under_review: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Summary row exposed next to an evaluation listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationView {
    pub id: EvaluationId,
    pub evaluator_id: UserId,
    pub total: u8,
    pub max_total: u8,
    pub recommendation: &'static str,
}

impl EvaluationView {
    pub fn of(evaluation: &Evaluation) -> Self {
        let summary = evaluation.total_score();
        Self {
            id: evaluation.id,
            evaluator_id: evaluation.evaluator_id,
            total: summary.score,
            max_total: summary.max_score,
            recommendation: evaluation.recommendation.label(),
        }
    }
}
