//! Candidature lifecycle: drafting, submission, evaluation, and decisions.
//!
//! The aggregate moves through a finite status graph; every mutation goes
//! through [`service::CandidatureService`], which persists first and then
//! dispatches the notification, dossier, and CRM side effects with failure
//! isolation. Collaborator boundaries are async traits so the engine runs
//! the same against the in-memory fixtures and the production adapters.

pub mod crm;
pub mod domain;
pub mod dossier;
pub(crate) mod effects;
pub mod evaluation;
pub mod notify;
pub mod repository;
pub mod router;
pub mod sections;
pub mod service;

#[cfg(test)]
mod tests;

pub use crm::{CandidatureCard, CrmError, CrmFieldMapping, CrmSync, MondayBoardClient};
pub use domain::{
    completion_from_flags, Actor, AdminDecision, ApplicantContact, Candidature, CandidatureId,
    CandidatureStatus, CompletionFlags, Document, NewCandidature, SectionKey, Sections, UserId,
    UserRole,
};
pub use dossier::{render_dossier_html, DossierError, DossierGenerator};
pub use effects::{EffectJournal, EffectKind, EffectWarning, JournaledFailure};
pub use evaluation::{
    CriterionScore, Evaluation, EvaluationError, EvaluationId, EvaluationStatus, NewEvaluation,
    Recommendation, ScoreSheet, ScoreSummary,
};
pub use notify::{
    template_for_status, EmailMessage, EmailTemplate, Notifier, NotifyError, RenderedEmail,
    TemplateCatalog, TemplateData,
};
pub use repository::{
    CandidatureRepository, CandidatureStatistics, EvaluationView, RepositoryError,
};
pub use router::candidature_router;
pub(crate) use router::error_response;
pub use sections::{
    CandidatureChanges, CandidatureUpdate, CompletionFlagsPatch, NewDocument, SectionPatchError,
};
pub use service::{
    CandidatureOutcome, CandidatureService, CandidatureServiceError, EvaluationOutcome,
};
