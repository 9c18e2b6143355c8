use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;

use super::crm::{CandidatureCard, CrmSync};
use super::domain::{
    Actor, AdminDecision, ApplicantContact, Candidature, CandidatureId, CandidatureStatus,
    NewCandidature, Sections, UserId,
};
use super::dossier::DossierGenerator;
use super::effects::{
    EffectJournal, EffectKind, EffectOutcome, EffectWarning, JournaledFailure, SideEffects,
};
use super::evaluation::{
    Evaluation, EvaluationError, EvaluationId, EvaluationStatus, NewEvaluation,
};
use super::notify::{template_for_status, EmailMessage, Notifier, TemplateCatalog, TemplateData};
use super::repository::{CandidatureRepository, CandidatureStatistics, RepositoryError};
use super::sections::{CandidatureChanges, CandidatureUpdate, SectionPatchError};

/// Service composing the repository, the template catalog, and the three
/// side-effect channels behind the candidature operations.
pub struct CandidatureService<R> {
    repository: Arc<R>,
    notifier: Arc<dyn Notifier>,
    dossiers: Arc<dyn DossierGenerator>,
    crm: Arc<dyn CrmSync>,
    templates: TemplateCatalog,
    settings: EngineConfig,
    effects: SideEffects,
}

static CANDIDATURE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static EVALUATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_candidature_id() -> CandidatureId {
    CandidatureId(CANDIDATURE_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn next_evaluation_id() -> EvaluationId {
    EvaluationId(EVALUATION_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// A mutated candidature together with any side-effect warnings raised while
/// dispatching its transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatureOutcome {
    pub candidature: Candidature,
    pub warnings: Vec<EffectWarning>,
}

impl CandidatureOutcome {
    fn clean(candidature: Candidature) -> Self {
        Self {
            candidature,
            warnings: Vec::new(),
        }
    }
}

/// An accepted evaluation and the candidature as it stands after the
/// status-advance hook ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub evaluation: Evaluation,
    pub candidature: Candidature,
    pub warnings: Vec<EffectWarning>,
}

impl<R> CandidatureService<R>
where
    R: CandidatureRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<dyn Notifier>,
        dossiers: Arc<dyn DossierGenerator>,
        crm: Arc<dyn CrmSync>,
        settings: EngineConfig,
    ) -> Self {
        let effects = SideEffects::new(settings.effect_timeout);
        Self {
            repository,
            notifier,
            dossiers,
            crm,
            templates: TemplateCatalog::seeded(),
            settings,
            effects,
        }
    }

    /// Replaces the seeded template catalog, primarily to exercise the
    /// catalog-miss path.
    pub fn with_templates(mut self, templates: TemplateCatalog) -> Self {
        self.templates = templates;
        self
    }

    /// Journal of side effects that failed and await manual replay.
    pub fn journal(&self) -> Arc<EffectJournal> {
        self.effects.journal()
    }

    /// Journal entries accumulated so far.
    pub fn failed_effects(&self) -> Vec<JournaledFailure> {
        self.effects.journal().entries()
    }

    /// Opens a draft candidature for the caller. A user keeps at most one
    /// candidature alive at a time; only a rejected one frees the slot.
    pub async fn create_candidature(
        &self,
        actor: Actor,
        applicant: ApplicantContact,
        new: NewCandidature,
    ) -> Result<Candidature, CandidatureServiceError> {
        if let Some(existing) = self.repository.find_active_for(actor.user_id).await? {
            return Err(CandidatureServiceError::ActiveCandidatureExists {
                existing: existing.id,
            });
        }

        let now = Utc::now();
        let sections = new.sections.unwrap_or_else(Sections::seeded);
        let phone = new
            .phone
            .filter(|value| !value.is_empty())
            .or_else(|| sections.reference_phone().map(str::to_string))
            .unwrap_or_default();
        let promotion = new
            .promotion
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.settings.default_promotion.clone());

        let candidature = Candidature {
            id: next_candidature_id(),
            user_id: actor.user_id,
            applicant,
            promotion,
            status: CandidatureStatus::Draft,
            phone,
            sections,
            documents: Vec::new(),
            completion_flags: new.completion_flags.unwrap_or_default(),
            completion_percentage: 0,
            submission_date: None,
            decision_date: None,
            admin_notes: None,
            generated_pdf_url: None,
            monday_item_id: None,
            created_at: now,
            updated_at: now,
        };

        let stored = self.repository.insert(candidature).await?;
        Ok(stored)
    }

    /// Fetches a candidature. Owners see their own; administrators see all.
    pub async fn get_candidature(
        &self,
        actor: Actor,
        id: CandidatureId,
    ) -> Result<Candidature, CandidatureServiceError> {
        let candidature = self
            .repository
            .fetch(id)
            .await?
            .ok_or(CandidatureServiceError::NotFound)?;

        if !actor.is_admin() && actor.user_id != candidature.user_id {
            return Err(CandidatureServiceError::Forbidden);
        }

        Ok(candidature)
    }

    /// Applies a partial update to the form data. Owners may edit while the
    /// record is in draft; administrators may edit at any stage.
    pub async fn update_candidature(
        &self,
        actor: Actor,
        id: CandidatureId,
        update: CandidatureUpdate,
    ) -> Result<Candidature, CandidatureServiceError> {
        let candidature = self
            .repository
            .fetch(id)
            .await?
            .ok_or(CandidatureServiceError::NotFound)?;

        if !candidature.editable_by(&actor) {
            return Err(CandidatureServiceError::Forbidden);
        }

        let changes = update.into_changes(&candidature, Utc::now())?;
        if changes.is_empty() {
            return Ok(candidature);
        }

        let updated = self.repository.update(id, changes).await?;
        Ok(updated)
    }

    /// Submits a draft for review once its completion clears the configured
    /// threshold. The dossier, the CRM card, and the confirmation email are
    /// dispatched after the status write; their failures come back as
    /// warnings on the outcome, never as errors.
    pub async fn submit_candidature(
        &self,
        actor: Actor,
        id: CandidatureId,
    ) -> Result<CandidatureOutcome, CandidatureServiceError> {
        let candidature = self
            .repository
            .fetch(id)
            .await?
            .ok_or(CandidatureServiceError::NotFound)?;

        if actor.user_id != candidature.user_id {
            return Err(CandidatureServiceError::Forbidden);
        }
        if candidature.status != CandidatureStatus::Draft {
            return Err(CandidatureServiceError::InvalidTransition {
                from: candidature.status,
                to: CandidatureStatus::Submitted,
            });
        }

        let threshold = self.settings.submission_threshold;
        if candidature.completion_percentage < threshold {
            return Err(CandidatureServiceError::IncompleteCandidature {
                percentage: candidature.completion_percentage,
                threshold,
            });
        }

        let mut changes = CandidatureChanges::status_change(CandidatureStatus::Submitted);
        // A candidature returned to draft keeps its original submission date.
        if candidature.submission_date.is_none() {
            changes.submission_date = Some(Utc::now());
        }

        let submitted = self.repository.update(id, changes).await?;
        info!(
            candidature = %submitted.id,
            from = CandidatureStatus::Draft.label(),
            to = submitted.status.label(),
            "candidature submitted"
        );

        let (warnings, follow_up) = self
            .dispatch_transition_effects(
                &submitted,
                template_for_status(CandidatureStatus::Submitted),
                None,
                true,
            )
            .await;

        let candidature = self.persist_follow_up(submitted, follow_up).await;

        Ok(CandidatureOutcome {
            candidature,
            warnings,
        })
    }

    /// Status-advance hook fired once an evaluation lands. The first sheet
    /// against a submitted candidature moves it under review; on any other
    /// status the hook leaves the record untouched.
    pub async fn record_evaluation_created(
        &self,
        id: CandidatureId,
    ) -> Result<CandidatureOutcome, CandidatureServiceError> {
        let candidature = self
            .repository
            .fetch(id)
            .await?
            .ok_or(CandidatureServiceError::NotFound)?;

        if candidature.status != CandidatureStatus::Submitted {
            return Ok(CandidatureOutcome::clean(candidature));
        }

        let moved = match self
            .repository
            .transition_status(
                id,
                CandidatureStatus::Submitted,
                CandidatureStatus::UnderReview,
            )
            .await?
        {
            Some(moved) => moved,
            // Another evaluator won the compare-and-set; their call carries
            // the transition effects.
            None => {
                let current = self
                    .repository
                    .fetch(id)
                    .await?
                    .ok_or(CandidatureServiceError::NotFound)?;
                return Ok(CandidatureOutcome::clean(current));
            }
        };

        info!(
            candidature = %moved.id,
            from = CandidatureStatus::Submitted.label(),
            to = moved.status.label(),
            "candidature moved under review"
        );

        let (warnings, follow_up) = self
            .dispatch_transition_effects(
                &moved,
                template_for_status(CandidatureStatus::UnderReview),
                None,
                false,
            )
            .await;

        let candidature = self.persist_follow_up(moved, follow_up).await;

        Ok(CandidatureOutcome {
            candidature,
            warnings,
        })
    }

    /// Stores a jury evaluation, then fires the status-advance hook. Each
    /// evaluator files at most one sheet per candidature.
    pub async fn record_evaluation(
        &self,
        actor: Actor,
        candidature_id: CandidatureId,
        new: NewEvaluation,
    ) -> Result<EvaluationOutcome, CandidatureServiceError> {
        if !actor.is_admin() {
            return Err(CandidatureServiceError::Forbidden);
        }

        new.scores.validate()?;

        self.repository
            .fetch(candidature_id)
            .await?
            .ok_or(CandidatureServiceError::NotFound)?;

        if self
            .repository
            .find_evaluation(candidature_id, actor.user_id)
            .await?
            .is_some()
        {
            return Err(CandidatureServiceError::DuplicateEvaluation {
                evaluator: actor.user_id,
            });
        }

        let evaluation = Evaluation {
            id: next_evaluation_id(),
            candidature_id,
            evaluator_id: actor.user_id,
            scores: new.scores,
            general_comment: new.general_comment,
            recommendation: new.recommendation,
            status: EvaluationStatus::InProgress,
            created_at: Utc::now(),
        };

        let stored = self.repository.insert_evaluation(evaluation).await?;
        let advanced = self.record_evaluation_created(candidature_id).await?;

        Ok(EvaluationOutcome {
            evaluation: stored,
            candidature: advanced.candidature,
            warnings: advanced.warnings,
        })
    }

    /// Evaluations filed against a candidature.
    pub async fn evaluations(
        &self,
        actor: Actor,
        candidature_id: CandidatureId,
    ) -> Result<Vec<Evaluation>, CandidatureServiceError> {
        if !actor.is_admin() {
            return Err(CandidatureServiceError::Forbidden);
        }

        self.repository
            .fetch(candidature_id)
            .await?
            .ok_or(CandidatureServiceError::NotFound)?;

        Ok(self.repository.evaluations_for(candidature_id).await?)
    }

    /// Applies a review decision. Only edges in the status graph are
    /// accepted; final decisions stamp the decision date.
    pub async fn apply_admin_decision(
        &self,
        actor: Actor,
        id: CandidatureId,
        decision: AdminDecision,
        notes: Option<String>,
    ) -> Result<CandidatureOutcome, CandidatureServiceError> {
        if !actor.is_admin() {
            return Err(CandidatureServiceError::Forbidden);
        }

        let candidature = self
            .repository
            .fetch(id)
            .await?
            .ok_or(CandidatureServiceError::NotFound)?;

        let target = decision.target_status();
        if !candidature.status.can_transition_to(target) {
            return Err(CandidatureServiceError::InvalidTransition {
                from: candidature.status,
                to: target,
            });
        }

        let mut changes = CandidatureChanges::status_change(target);
        if decision.is_final() {
            changes.decision_date = Some(Utc::now());
        }
        changes.admin_notes = notes.filter(|notes| !notes.trim().is_empty());

        let updated = self.repository.update(id, changes).await?;
        info!(
            candidature = %updated.id,
            decision = decision.label(),
            from = candidature.status.label(),
            to = target.label(),
            "admin decision applied"
        );

        let (warnings, follow_up) = self
            .dispatch_transition_effects(
                &updated,
                decision.email_template(),
                updated.admin_notes.as_deref(),
                false,
            )
            .await;

        let candidature = self.persist_follow_up(updated, follow_up).await;

        Ok(CandidatureOutcome {
            candidature,
            warnings,
        })
    }

    /// Dashboard counters over the whole collection.
    pub async fn statistics(
        &self,
        actor: Actor,
    ) -> Result<CandidatureStatistics, CandidatureServiceError> {
        if !actor.is_admin() {
            return Err(CandidatureServiceError::Forbidden);
        }

        let mut stats = CandidatureStatistics::default();
        for status in CandidatureStatus::ALL {
            let count = self.repository.count_by_status(status).await?;
            stats.total += count;
            match status {
                CandidatureStatus::Submitted => stats.submitted = count,
                CandidatureStatus::UnderReview => stats.under_review = count,
                CandidatureStatus::Accepted => stats.accepted = count,
                CandidatureStatus::Rejected => stats.rejected = count,
                CandidatureStatus::Draft | CandidatureStatus::Shortlisted => {}
            }
        }

        Ok(stats)
    }

    /// Runs the notification, dossier, and CRM channels for a persisted
    /// transition. The three run concurrently, each under its own deadline;
    /// the returned change set carries results to store back on the record.
    async fn dispatch_transition_effects(
        &self,
        candidature: &Candidature,
        template: Option<&str>,
        admin_notes: Option<&str>,
        with_dossier: bool,
    ) -> (Vec<EffectWarning>, CandidatureChanges) {
        let notification = async {
            let Some(name) = template else {
                return (EffectOutcome::Skipped, None);
            };
            let data = TemplateData::for_candidature(
                candidature,
                &self.settings.application_base_url,
                admin_notes,
            );
            let Some(rendered) = self.templates.render(name, &data) else {
                warn!(
                    candidature = %candidature.id,
                    template = name,
                    "email template missing, notification skipped"
                );
                return (EffectOutcome::Skipped, None);
            };
            let message = EmailMessage {
                to: candidature.applicant.email.clone(),
                subject: rendered.subject,
                body: rendered.body,
            };
            self.effects
                .run(
                    candidature.id,
                    candidature.status,
                    EffectKind::Notification,
                    self.notifier.send(message),
                )
                .await
        };

        let dossier = async {
            if !with_dossier {
                return (EffectOutcome::Skipped, None);
            }
            self.effects
                .run(
                    candidature.id,
                    candidature.status,
                    EffectKind::Dossier,
                    self.dossiers.generate(candidature),
                )
                .await
        };

        let crm = async {
            // Draft stays off the board; the card keeps its last pre-draft
            // status until the candidature moves again.
            if candidature.status == CandidatureStatus::Draft {
                return (EffectOutcome::Skipped, None);
            }
            let card = CandidatureCard::of(candidature);
            match &candidature.monday_item_id {
                Some(item_id) => {
                    let (outcome, _) = self
                        .effects
                        .run(
                            candidature.id,
                            candidature.status,
                            EffectKind::CrmSync,
                            self.crm.update(item_id, &card),
                        )
                        .await;
                    (outcome, None)
                }
                None => {
                    self.effects
                        .run(
                            candidature.id,
                            candidature.status,
                            EffectKind::CrmSync,
                            self.crm.create(&card),
                        )
                        .await
                }
            }
        };

        let ((email_outcome, _), (dossier_outcome, dossier_url), (crm_outcome, item_id)) =
            tokio::join!(notification, dossier, crm);

        let mut warnings = Vec::new();
        warnings.extend(email_outcome.warning());
        warnings.extend(dossier_outcome.warning());
        warnings.extend(crm_outcome.warning());

        let follow_up = CandidatureChanges {
            generated_pdf_url: dossier_url,
            monday_item_id: item_id,
            ..CandidatureChanges::default()
        };

        (warnings, follow_up)
    }

    /// Stores effect results, the dossier URL and the CRM item id, back on
    /// the record. The effects already ran; a write failure here is logged
    /// and the pre-write record returned.
    async fn persist_follow_up(
        &self,
        candidature: Candidature,
        follow_up: CandidatureChanges,
    ) -> Candidature {
        if follow_up.is_empty() {
            return candidature;
        }

        match self.repository.update(candidature.id, follow_up).await {
            Ok(updated) => updated,
            Err(err) => {
                warn!(
                    candidature = %candidature.id,
                    error = %err,
                    "failed to persist side-effect results"
                );
                candidature
            }
        }
    }
}

/// Error raised by the candidature service.
#[derive(Debug, thiserror::Error)]
pub enum CandidatureServiceError {
    #[error("candidature not found")]
    NotFound,
    #[error("actor is not allowed to perform this operation")]
    Forbidden,
    #[error("candidature is {percentage}% complete, {threshold}% required to submit")]
    IncompleteCandidature { percentage: u8, threshold: u8 },
    #[error("user already has an active candidature ({existing})")]
    ActiveCandidatureExists { existing: CandidatureId },
    #[error("cannot move a candidature from {} to {}", from.label(), to.label())]
    InvalidTransition {
        from: CandidatureStatus,
        to: CandidatureStatus,
    },
    #[error("evaluator {evaluator} has already scored this candidature")]
    DuplicateEvaluation { evaluator: UserId },
    #[error(transparent)]
    Patch(#[from] SectionPatchError),
    #[error(transparent)]
    Scores(#[from] EvaluationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
