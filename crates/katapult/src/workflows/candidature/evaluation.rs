//! Jury evaluation capture.
//!
//! Each evaluator files at most one score sheet per candidature: five
//! criteria scored 0 to 5, free-text comments, and a recommendation. The
//! first sheet filed against a submitted candidature moves it under review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CandidatureId, UserId};

/// Identifier wrapper for evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationId(pub u64);

/// One criterion score with its optional comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// The five-criterion score sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSheet {
    pub innovation: CriterionScore,
    pub viability: CriterionScore,
    pub impact: CriterionScore,
    pub team: CriterionScore,
    pub alignment: CriterionScore,
}

impl ScoreSheet {
    pub const CRITERION_MAX: u8 = 5;
    pub const TOTAL_MAX: u8 = 25;

    fn criteria(&self) -> [(&'static str, &CriterionScore); 5] {
        [
            ("innovation", &self.innovation),
            ("viability", &self.viability),
            ("impact", &self.impact),
            ("team", &self.team),
            ("alignment", &self.alignment),
        ]
    }

    pub fn total(&self) -> u8 {
        self.criteria()
            .into_iter()
            .map(|(_, criterion)| criterion.score)
            .sum()
    }

    pub fn validate(&self) -> Result<(), EvaluationError> {
        for (name, criterion) in self.criteria() {
            if criterion.score > Self::CRITERION_MAX {
                return Err(EvaluationError::ScoreOutOfRange {
                    criterion: name,
                    score: criterion.score,
                });
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> ScoreSummary {
        let score = self.total();
        let percentage =
            (f64::from(score) / f64::from(Self::TOTAL_MAX) * 100.0).round() as u8;
        ScoreSummary {
            score,
            max_score: Self::TOTAL_MAX,
            percentage,
        }
    }
}

/// Aggregate view of a score sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreSummary {
    pub score: u8,
    pub max_score: u8,
    pub percentage: u8,
}

/// Verdict the evaluator leaves at the end of the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Accept,
    Reject,
    Discuss,
}

impl Recommendation {
    pub const fn label(self) -> &'static str {
        match self {
            Recommendation::Accept => "accept",
            Recommendation::Reject => "reject",
            Recommendation::Discuss => "discuss",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Recommendation::Accept => "Accepter",
            Recommendation::Reject => "Rejeter",
            Recommendation::Discuss => "À discuter",
        }
    }
}

/// Lifecycle of an individual score sheet. Sheets start in progress; closing
/// the jury round finalizes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    #[default]
    InProgress,
    Finalized,
}

impl EvaluationStatus {
    pub const fn display_name(self) -> &'static str {
        match self {
            EvaluationStatus::InProgress => "En cours",
            EvaluationStatus::Finalized => "Terminée",
        }
    }
}

/// Wire payload for filing an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewEvaluation {
    pub scores: ScoreSheet,
    #[serde(default)]
    pub general_comment: Option<String>,
    pub recommendation: Recommendation,
}

/// A persisted evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub candidature_id: CandidatureId,
    pub evaluator_id: UserId,
    pub scores: ScoreSheet,
    pub general_comment: Option<String>,
    pub recommendation: Recommendation,
    pub status: EvaluationStatus,
    pub created_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn total_score(&self) -> ScoreSummary {
        self.scores.summary()
    }
}

/// Validation failures for score sheets.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("{criterion} score must be between 0 and 5, got {score}")]
    ScoreOutOfRange { criterion: &'static str, score: u8 },
}
