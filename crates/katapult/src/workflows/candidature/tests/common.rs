use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::workflows::candidature::crm::{CandidatureCard, CrmError, CrmSync};
use crate::workflows::candidature::domain::{
    Actor, ApplicantContact, Candidature, CandidatureId, CandidatureStatus, NewCandidature, UserId,
};
use crate::workflows::candidature::dossier::{DossierError, DossierGenerator};
use crate::workflows::candidature::evaluation::{
    CriterionScore, Evaluation, NewEvaluation, Recommendation, ScoreSheet,
};
use crate::workflows::candidature::notify::{EmailMessage, Notifier, NotifyError};
use crate::workflows::candidature::repository::{CandidatureRepository, RepositoryError};
use crate::workflows::candidature::sections::{CandidatureChanges, CandidatureUpdate};
use crate::workflows::candidature::{candidature_router, CandidatureService};

pub(super) fn engine_config() -> EngineConfig {
    EngineConfig {
        submission_threshold: 90,
        application_base_url: "https://app.katapult.example".to_string(),
        default_promotion: "Katapult 2025".to_string(),
        effect_timeout: Duration::from_secs(2),
        dossier_dir: PathBuf::from("dossiers"),
    }
}

pub(super) fn short_timeout_config() -> EngineConfig {
    EngineConfig {
        effect_timeout: Duration::from_millis(50),
        ..engine_config()
    }
}

pub(super) fn applicant() -> ApplicantContact {
    ApplicantContact {
        first_name: "Marie".to_string(),
        last_name: "Dupont".to_string(),
        email: "marie.dupont@example.org".to_string(),
    }
}

pub(super) fn owner() -> UserId {
    UserId(41)
}

pub(super) fn admin() -> Actor {
    Actor::admin(UserId(900))
}

/// Update that fills enough of the form to clear the submission threshold.
pub(super) fn ready_update() -> CandidatureUpdate {
    CandidatureUpdate {
        fiche_identite: Some(json!({
            "projectName": "Ressourcerie du Bocage",
            "projectDescription": "Collecte et revalorisation d'objets du quotidien",
            "phone": "0233445566",
            "city": "Flers",
            "territory": "Orne",
            "country": "France",
        })),
        projet_utilite_sociale: Some(json!({
            "sector": "Économie circulaire",
            "projectSummary": "Réduire les déchets du territoire en redonnant une seconde vie aux objets collectés.",
        })),
        completion_percentage: Some(95),
        ..CandidatureUpdate::default()
    }
}

pub(super) fn scores(value: u8) -> ScoreSheet {
    let criterion = CriterionScore {
        score: value,
        comment: None,
    };
    ScoreSheet {
        innovation: criterion.clone(),
        viability: criterion.clone(),
        impact: criterion.clone(),
        team: criterion.clone(),
        alignment: criterion,
    }
}

pub(super) fn evaluation_draft() -> NewEvaluation {
    NewEvaluation {
        scores: scores(4),
        general_comment: Some("Projet solide et bien ancré localement".to_string()),
        recommendation: Recommendation::Accept,
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) candidatures: Arc<Mutex<HashMap<CandidatureId, Candidature>>>,
    pub(super) evaluations: Arc<Mutex<Vec<Evaluation>>>,
}

#[async_trait]
impl CandidatureRepository for MemoryRepository {
    async fn insert(&self, candidature: Candidature) -> Result<Candidature, RepositoryError> {
        let mut guard = self.candidatures.lock().expect("repository mutex poisoned");
        if guard.contains_key(&candidature.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(candidature.id, candidature.clone());
        Ok(candidature)
    }

    async fn fetch(&self, id: CandidatureId) -> Result<Option<Candidature>, RepositoryError> {
        let guard = self.candidatures.lock().expect("repository mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    async fn update(
        &self,
        id: CandidatureId,
        changes: CandidatureChanges,
    ) -> Result<Candidature, RepositoryError> {
        let mut guard = self.candidatures.lock().expect("repository mutex poisoned");
        let record = guard.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        changes.apply_to(record, Utc::now());
        Ok(record.clone())
    }

    async fn transition_status(
        &self,
        id: CandidatureId,
        from: CandidatureStatus,
        to: CandidatureStatus,
    ) -> Result<Option<Candidature>, RepositoryError> {
        let mut guard = self.candidatures.lock().expect("repository mutex poisoned");
        let record = guard.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if record.status != from {
            return Ok(None);
        }
        record.status = to;
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn find_active_for(
        &self,
        user_id: UserId,
    ) -> Result<Option<Candidature>, RepositoryError> {
        let guard = self.candidatures.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|record| {
                record.user_id == user_id && record.status != CandidatureStatus::Rejected
            })
            .cloned())
    }

    async fn count_by_status(&self, status: CandidatureStatus) -> Result<u64, RepositoryError> {
        let guard = self.candidatures.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| record.status == status)
            .count() as u64)
    }

    async fn insert_evaluation(
        &self,
        evaluation: Evaluation,
    ) -> Result<Evaluation, RepositoryError> {
        let mut guard = self.evaluations.lock().expect("evaluation mutex poisoned");
        guard.push(evaluation.clone());
        Ok(evaluation)
    }

    async fn evaluations_for(
        &self,
        candidature_id: CandidatureId,
    ) -> Result<Vec<Evaluation>, RepositoryError> {
        let guard = self.evaluations.lock().expect("evaluation mutex poisoned");
        Ok(guard
            .iter()
            .filter(|evaluation| evaluation.candidature_id == candidature_id)
            .cloned()
            .collect())
    }

    async fn find_evaluation(
        &self,
        candidature_id: CandidatureId,
        evaluator_id: UserId,
    ) -> Result<Option<Evaluation>, RepositoryError> {
        let guard = self.evaluations.lock().expect("evaluation mutex poisoned");
        Ok(guard
            .iter()
            .find(|evaluation| {
                evaluation.candidature_id == candidature_id
                    && evaluation.evaluator_id == evaluator_id
            })
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingNotifier {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(message);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _message: EmailMessage) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingDossier {
    generated: Arc<Mutex<Vec<CandidatureId>>>,
}

impl RecordingDossier {
    pub(super) fn generated(&self) -> Vec<CandidatureId> {
        self.generated
            .lock()
            .expect("dossier mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl DossierGenerator for RecordingDossier {
    async fn generate(&self, candidature: &Candidature) -> Result<String, DossierError> {
        self.generated
            .lock()
            .expect("dossier mutex poisoned")
            .push(candidature.id);
        Ok(format!("dossiers/candidature-{}.html", candidature.id))
    }
}

pub(super) struct FailingDossier;

#[async_trait]
impl DossierGenerator for FailingDossier {
    async fn generate(&self, _candidature: &Candidature) -> Result<String, DossierError> {
        Err(DossierError::Storage("disk full".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingCrm {
    create_calls: Arc<Mutex<Vec<CandidatureCard>>>,
    update_calls: Arc<Mutex<Vec<(String, CandidatureCard)>>>,
}

impl RecordingCrm {
    pub(super) fn create_calls(&self) -> Vec<CandidatureCard> {
        self.create_calls
            .lock()
            .expect("crm mutex poisoned")
            .clone()
    }

    pub(super) fn update_calls(&self) -> Vec<(String, CandidatureCard)> {
        self.update_calls
            .lock()
            .expect("crm mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl CrmSync for RecordingCrm {
    async fn create(&self, card: &CandidatureCard) -> Result<String, CrmError> {
        self.create_calls
            .lock()
            .expect("crm mutex poisoned")
            .push(card.clone());
        Ok("7312024".to_string())
    }

    async fn update(&self, item_id: &str, card: &CandidatureCard) -> Result<(), CrmError> {
        self.update_calls
            .lock()
            .expect("crm mutex poisoned")
            .push((item_id.to_string(), card.clone()));
        Ok(())
    }
}

pub(super) struct FailingCrm;

#[async_trait]
impl CrmSync for FailingCrm {
    async fn create(&self, _card: &CandidatureCard) -> Result<String, CrmError> {
        Err(CrmError::Transport("board unreachable".to_string()))
    }

    async fn update(&self, _item_id: &str, _card: &CandidatureCard) -> Result<(), CrmError> {
        Err(CrmError::Transport("board unreachable".to_string()))
    }
}

pub(super) struct SlowCrm;

#[async_trait]
impl CrmSync for SlowCrm {
    async fn create(&self, _card: &CandidatureCard) -> Result<String, CrmError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("late".to_string())
    }

    async fn update(&self, _item_id: &str, _card: &CandidatureCard) -> Result<(), CrmError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

pub(super) fn build_service() -> (
    CandidatureService<MemoryRepository>,
    MemoryRepository,
    RecordingNotifier,
    RecordingDossier,
    RecordingCrm,
) {
    let repository = MemoryRepository::default();
    let notifier = RecordingNotifier::default();
    let dossiers = RecordingDossier::default();
    let crm = RecordingCrm::default();
    let service = CandidatureService::new(
        Arc::new(repository.clone()),
        Arc::new(notifier.clone()),
        Arc::new(dossiers.clone()),
        Arc::new(crm.clone()),
        engine_config(),
    );
    (service, repository, notifier, dossiers, crm)
}

pub(super) async fn create_draft(
    service: &CandidatureService<MemoryRepository>,
    user: UserId,
) -> Candidature {
    service
        .create_candidature(Actor::applicant(user), applicant(), NewCandidature::default())
        .await
        .expect("draft created")
}

/// A draft already filled past the submission threshold.
pub(super) async fn create_ready_draft(
    service: &CandidatureService<MemoryRepository>,
    user: UserId,
) -> Candidature {
    let draft = create_draft(service, user).await;
    service
        .update_candidature(Actor::applicant(user), draft.id, ready_update())
        .await
        .expect("draft completed")
}

pub(super) fn candidature_router_with_service(
    service: CandidatureService<MemoryRepository>,
) -> axum::Router {
    candidature_router(Arc::new(service))
}

pub(super) fn json_request(
    method: &str,
    uri: &str,
    user_id: u64,
    role: &str,
    body: &Value,
) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .header("x-user-id", user_id.to_string())
        .header("x-user-role", role)
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serialize body"),
        ))
        .expect("request")
}

pub(super) fn bare_request(
    method: &str,
    uri: &str,
    user_id: u64,
    role: &str,
) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user_id.to_string())
        .header("x-user-role", role)
        .body(axum::body::Body::empty())
        .expect("request")
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
