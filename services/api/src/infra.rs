use async_trait::async_trait;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

use katapult::workflows::candidature::domain::{
    Candidature, CandidatureId, CandidatureStatus, UserId,
};
use katapult::workflows::candidature::{
    render_dossier_html, CandidatureCard, CandidatureChanges, CandidatureRepository, CrmError,
    CrmSync, DossierError, DossierGenerator, EmailMessage, Evaluation, Notifier, NotifyError,
    RepositoryError,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Mutex-backed candidature store, the persistence layer until a database
/// is wired in.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCandidatureRepository {
    candidatures: Arc<Mutex<HashMap<CandidatureId, Candidature>>>,
    evaluations: Arc<Mutex<Vec<Evaluation>>>,
}

#[async_trait]
impl CandidatureRepository for InMemoryCandidatureRepository {
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

/// Notifier that queues messages in an in-process outbox and logs each send.
/// Stands in for the SMTP relay until one is configured.
#[derive(Default, Clone)]
pub(crate) struct OutboxNotifier {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl OutboxNotifier {
    pub(crate) fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("outbox mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError> {
        info!(to = %message.to, subject = %message.subject, "email queued in outbox");
        self.sent
            .lock()
            .expect("outbox mutex poisoned")
            .push(message);
        Ok(())
    }
}

/// Writes rendered dossiers under the configured directory and answers with
/// the file path.
pub(crate) struct FileDossierGenerator {
    dir: PathBuf,
}

impl FileDossierGenerator {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl DossierGenerator for FileDossierGenerator {
    async fn generate(&self, candidature: &Candidature) -> Result<String, DossierError> {
        let html = render_dossier_html(candidature);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| DossierError::Storage(err.to_string()))?;

        let path = self.dir.join(format!("candidature-{}.html", candidature.id));
        tokio::fs::write(&path, html)
            .await
            .map_err(|err| DossierError::Storage(err.to_string()))?;

        Ok(path.to_string_lossy().into_owned())
    }
}

/// Local stand-in for the Monday.com board, used when no API token is
/// configured. Cards live in memory under `local-N` item ids.
#[derive(Default, Clone)]
pub(crate) struct LocalBoardCrm {
    items: Arc<Mutex<HashMap<String, CandidatureCard>>>,
    sequence: Arc<AtomicU64>,
}

impl LocalBoardCrm {
    pub(crate) fn items(&self) -> Vec<(String, CandidatureCard)> {
        let guard = self.items.lock().expect("board mutex poisoned");
        let mut items: Vec<_> = guard
            .iter()
            .map(|(id, card)| (id.clone(), card.clone()))
            .collect();
        items.sort_by(|(a, _), (b, _)| a.cmp(b));
        items
    }
}

#[async_trait]
impl CrmSync for LocalBoardCrm {
    async fn create(&self, card: &CandidatureCard) -> Result<String, CrmError> {
        let item_id = format!("local-{}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
        self.items
            .lock()
            .expect("board mutex poisoned")
            .insert(item_id.clone(), card.clone());
        Ok(item_id)
    }

    async fn update(&self, item_id: &str, card: &CandidatureCard) -> Result<(), CrmError> {
        self.items
            .lock()
            .expect("board mutex poisoned")
            .insert(item_id.to_string(), card.clone());
        Ok(())
    }
}
