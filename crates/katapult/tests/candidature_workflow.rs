//! Integration scenarios for the candidature lifecycle.
//!
//! Exercises the public service facade and the HTTP router end to end:
//! drafting, completion-gated submission, jury evaluation, administrative
//! decisions, and the side-effect isolation around each transition.

mod common {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    use katapult::config::EngineConfig;
    use katapult::workflows::candidature::domain::{
        ApplicantContact, Candidature, CandidatureId, CandidatureStatus, UserId,
    };
    use katapult::workflows::candidature::{
        CandidatureChanges, CandidatureCard, CandidatureRepository, CandidatureUpdate, CrmError,
        CrmSync, DossierError, DossierGenerator, EmailMessage, Evaluation, Notifier, NotifyError,
        RepositoryError,
    };

    pub(super) fn engine_config() -> EngineConfig {
        EngineConfig {
            submission_threshold: 90,
            application_base_url: "https://app.katapult.example".to_string(),
            default_promotion: "Katapult 2025".to_string(),
            effect_timeout: Duration::from_secs(2),
            dossier_dir: PathBuf::from("dossiers"),
        }
    }

    pub(super) fn applicant() -> ApplicantContact {
        ApplicantContact {
            first_name: "Marie".to_string(),
            last_name: "Dupont".to_string(),
            email: "marie.dupont@example.org".to_string(),
        }
    }

    /// Section payload that fills the form past the submission threshold.
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
                "projectSummary": "Réduire les déchets du territoire.",
            })),
            completion_percentage: Some(95),
            ..CandidatureUpdate::default()
        }
    }

    pub(super) fn evaluation_body() -> serde_json::Value {
        json!({
            "scores": {
                "innovation": { "score": 4 },
                "viability": { "score": 4, "comment": "Budget réaliste" },
                "impact": { "score": 5 },
                "team": { "score": 4 },
                "alignment": { "score": 4 },
            },
            "general_comment": "Projet mûr pour la promotion.",
            "recommendation": "accept",
        })
    }

    #[derive(Default, Clone)]
    pub(super) struct MemoryRepository {
        candidatures: Arc<Mutex<HashMap<CandidatureId, Candidature>>>,
        evaluations: Arc<Mutex<Vec<Evaluation>>>,
    }

    #[async_trait]
    impl CandidatureRepository for MemoryRepository {
        async fn insert(&self, candidature: Candidature) -> Result<Candidature, RepositoryError> {
            let mut guard = self.candidatures.lock().expect("lock");
            if guard.contains_key(&candidature.id) {
                return Err(RepositoryError::Conflict);
            }
            guard.insert(candidature.id, candidature.clone());
            Ok(candidature)
        }

        async fn fetch(&self, id: CandidatureId) -> Result<Option<Candidature>, RepositoryError> {
            Ok(self.candidatures.lock().expect("lock").get(&id).cloned())
        }

        async fn update(
            &self,
            id: CandidatureId,
            changes: CandidatureChanges,
        ) -> Result<Candidature, RepositoryError> {
            let mut guard = self.candidatures.lock().expect("lock");
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
            let mut guard = self.candidatures.lock().expect("lock");
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
            Ok(self
                .candidatures
                .lock()
                .expect("lock")
                .values()
                .find(|record| {
                    record.user_id == user_id && record.status != CandidatureStatus::Rejected
                })
                .cloned())
        }

        async fn count_by_status(
            &self,
            status: CandidatureStatus,
        ) -> Result<u64, RepositoryError> {
            Ok(self
                .candidatures
                .lock()
                .expect("lock")
                .values()
                .filter(|record| record.status == status)
                .count() as u64)
        }

        async fn insert_evaluation(
            &self,
            evaluation: Evaluation,
        ) -> Result<Evaluation, RepositoryError> {
            self.evaluations
                .lock()
                .expect("lock")
                .push(evaluation.clone());
            Ok(evaluation)
        }

        async fn evaluations_for(
            &self,
            candidature_id: CandidatureId,
        ) -> Result<Vec<Evaluation>, RepositoryError> {
            Ok(self
                .evaluations
                .lock()
                .expect("lock")
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
            Ok(self
                .evaluations
                .lock()
                .expect("lock")
                .iter()
                .find(|evaluation| {
                    evaluation.candidature_id == candidature_id
                        && evaluation.evaluator_id == evaluator_id
                })
                .cloned())
        }
    }

    #[derive(Default, Clone)]
    pub(super) struct MemoryNotifier {
        sent: Arc<Mutex<Vec<EmailMessage>>>,
    }

    impl MemoryNotifier {
        pub(super) fn sent(&self) -> Vec<EmailMessage> {
            self.sent.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Notifier for MemoryNotifier {
        async fn send(&self, message: EmailMessage) -> Result<(), NotifyError> {
            self.sent.lock().expect("lock").push(message);
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    pub(super) struct MemoryDossiers {
        generated: Arc<Mutex<Vec<CandidatureId>>>,
    }

    impl MemoryDossiers {
        pub(super) fn generated(&self) -> Vec<CandidatureId> {
            self.generated.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl DossierGenerator for MemoryDossiers {
        async fn generate(&self, candidature: &Candidature) -> Result<String, DossierError> {
            self.generated.lock().expect("lock").push(candidature.id);
            Ok(format!("dossiers/candidature-{}.html", candidature.id))
        }
    }

    #[derive(Default, Clone)]
    pub(super) struct MemoryBoard {
        cards: Arc<Mutex<Vec<(Option<String>, CandidatureCard)>>>,
    }

    impl MemoryBoard {
        pub(super) fn cards(&self) -> Vec<(Option<String>, CandidatureCard)> {
            self.cards.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl CrmSync for MemoryBoard {
        async fn create(&self, card: &CandidatureCard) -> Result<String, CrmError> {
            self.cards.lock().expect("lock").push((None, card.clone()));
            Ok("9000001".to_string())
        }

        async fn update(&self, item_id: &str, card: &CandidatureCard) -> Result<(), CrmError> {
            self.cards
                .lock()
                .expect("lock")
                .push((Some(item_id.to_string()), card.clone()));
            Ok(())
        }
    }

    pub(super) struct BrokenBoard;

    #[async_trait]
    impl CrmSync for BrokenBoard {
        async fn create(&self, _card: &CandidatureCard) -> Result<String, CrmError> {
            Err(CrmError::Transport("board unreachable".to_string()))
        }

        async fn update(&self, _item_id: &str, _card: &CandidatureCard) -> Result<(), CrmError> {
            Err(CrmError::Transport("board unreachable".to_string()))
        }
    }

    pub(super) struct BrokenArchive;

    #[async_trait]
    impl DossierGenerator for BrokenArchive {
        async fn generate(&self, _candidature: &Candidature) -> Result<String, DossierError> {
            Err(DossierError::Storage("disk full".to_string()))
        }
    }

    pub(super) use MemoryRepository as Repository;
}

mod lifecycle {
    use std::sync::Arc;

    use super::common::*;
    use katapult::workflows::candidature::domain::{
        Actor, AdminDecision, CandidatureStatus, NewCandidature, UserId,
    };
    use katapult::workflows::candidature::{CandidatureService, CandidatureUpdate, EffectKind};

    fn build_service() -> (
        CandidatureService<Repository>,
        MemoryNotifier,
        MemoryDossiers,
        MemoryBoard,
    ) {
        let notifier = MemoryNotifier::default();
        let dossiers = MemoryDossiers::default();
        let board = MemoryBoard::default();
        let service = CandidatureService::new(
            Arc::new(Repository::default()),
            Arc::new(notifier.clone()),
            Arc::new(dossiers.clone()),
            Arc::new(board.clone()),
            engine_config(),
        );
        (service, notifier, dossiers, board)
    }

    #[tokio::test]
    async fn a_candidature_travels_from_draft_to_acceptance() {
        let (service, notifier, dossiers, board) = build_service();
        let owner = Actor::applicant(UserId(41));
        let jury = Actor::admin(UserId(900));

        let draft = service
            .create_candidature(owner, applicant(), NewCandidature::default())
            .await
            .expect("draft created");
        assert_eq!(draft.status, CandidatureStatus::Draft);

        service
            .update_candidature(owner, draft.id, ready_update())
            .await
            .expect("form filled");

        let submitted = service
            .submit_candidature(owner, draft.id)
            .await
            .expect("submission succeeds");
        assert!(submitted.warnings.is_empty());
        assert_eq!(submitted.candidature.status, CandidatureStatus::Submitted);
        assert!(submitted.candidature.submission_date.is_some());
        assert_eq!(
            submitted.candidature.monday_item_id.as_deref(),
            Some("9000001")
        );
        assert_eq!(dossiers.generated(), vec![draft.id]);

        let evaluation = serde_json::from_value(evaluation_body()).expect("valid payload");
        let evaluated = service
            .record_evaluation(jury, draft.id, evaluation)
            .await
            .expect("evaluation recorded");
        assert_eq!(evaluated.candidature.status, CandidatureStatus::UnderReview);
        assert_eq!(evaluated.evaluation.total_score().score, 21);

        let accepted = service
            .apply_admin_decision(jury, draft.id, AdminDecision::Accept, None)
            .await
            .expect("decision applied");
        assert_eq!(accepted.candidature.status, CandidatureStatus::Accepted);
        assert!(accepted.candidature.decision_date.is_some());

        // Submission, review, and acceptance each emailed the applicant.
        let subjects: Vec<String> = notifier
            .sent()
            .into_iter()
            .map(|message| message.subject)
            .collect();
        assert_eq!(subjects.len(), 3);
        assert!(subjects[0].contains("soumise"));
        assert!(subjects[1].contains("évaluation"));
        assert!(subjects[2].contains("acceptée"));

        // One card created, then updated on each later transition.
        let cards = board.cards();
        assert_eq!(cards.len(), 3);
        assert!(cards[0].0.is_none());
        assert!(cards[1..].iter().all(|(item, _)| item.is_some()));

        assert!(service.failed_effects().is_empty());
    }

    #[tokio::test]
    async fn broken_collaborators_never_roll_back_a_transition() {
        let notifier = MemoryNotifier::default();
        let service = CandidatureService::new(
            Arc::new(Repository::default()),
            Arc::new(notifier.clone()),
            Arc::new(BrokenArchive),
            Arc::new(BrokenBoard),
            engine_config(),
        );
        let owner = Actor::applicant(UserId(52));

        let draft = service
            .create_candidature(owner, applicant(), NewCandidature::default())
            .await
            .expect("draft created");
        service
            .update_candidature(owner, draft.id, ready_update())
            .await
            .expect("form filled");

        let outcome = service
            .submit_candidature(owner, draft.id)
            .await
            .expect("submission still succeeds");

        assert_eq!(outcome.candidature.status, CandidatureStatus::Submitted);
        assert!(outcome.candidature.generated_pdf_url.is_none());
        assert!(outcome.candidature.monday_item_id.is_none());
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome
            .warnings
            .iter()
            .any(|warning| warning.effect == EffectKind::Dossier));
        assert!(outcome
            .warnings
            .iter()
            .any(|warning| warning.effect == EffectKind::CrmSync));
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(service.failed_effects().len(), 2);
    }

    #[tokio::test]
    async fn a_returned_draft_resubmits_with_its_original_date() {
        let (service, _, _, board) = build_service();
        let owner = Actor::applicant(UserId(63));
        let jury = Actor::admin(UserId(900));

        let draft = service
            .create_candidature(owner, applicant(), NewCandidature::default())
            .await
            .expect("draft created");
        service
            .update_candidature(owner, draft.id, ready_update())
            .await
            .expect("form filled");
        let first = service
            .submit_candidature(owner, draft.id)
            .await
            .expect("first submission");
        let original = first.candidature.submission_date.expect("date stamped");

        let returned = service
            .apply_admin_decision(
                jury,
                draft.id,
                AdminDecision::ReturnToDraft,
                Some("Merci de préciser le budget prévisionnel.".to_string()),
            )
            .await
            .expect("returned to draft");
        assert_eq!(returned.candidature.status, CandidatureStatus::Draft);

        let update = CandidatureUpdate {
            completion_percentage: Some(100),
            ..CandidatureUpdate::default()
        };
        service
            .update_candidature(owner, draft.id, update)
            .await
            .expect("form amended");

        let second = service
            .submit_candidature(owner, draft.id)
            .await
            .expect("resubmission");
        assert_eq!(second.candidature.submission_date, Some(original));

        // Created exactly once; every later sync updates the same card.
        let creates = board
            .cards()
            .into_iter()
            .filter(|(item, _)| item.is_none())
            .count();
        assert_eq!(creates, 1);
    }
}

mod routing {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::common::*;
    use katapult::workflows::candidature::{candidature_router, CandidatureService};

    fn build_router() -> axum::Router {
        let service = CandidatureService::new(
            Arc::new(Repository::default()),
            Arc::new(MemoryNotifier::default()),
            Arc::new(MemoryDossiers::default()),
            Arc::new(MemoryBoard::default()),
            engine_config(),
        );
        candidature_router(Arc::new(service))
    }

    fn request(method: &str, uri: &str, user: Option<(u64, &str)>, body: Option<&Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = user {
            builder = builder
                .header("x-user-id", user_id.to_string())
                .header("x-user-role", role);
        }
        match body {
            Some(value) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(value).expect("serialize")))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }

    #[tokio::test]
    async fn the_full_lifecycle_runs_over_http() {
        let router = build_router();

        let created = router
            .clone()
            .oneshot(request(
                "POST",
                "/api/v1/candidatures",
                Some((41, "applicant")),
                Some(&json!({
                    "applicant": {
                        "first_name": "Marie",
                        "last_name": "Dupont",
                        "email": "marie.dupont@example.org",
                    },
                })),
            ))
            .await
            .expect("router dispatch");
        assert_eq!(created.status(), StatusCode::CREATED);
        let payload = json_body(created).await;
        let id = payload.get("id").and_then(Value::as_u64).expect("id");

        let filled = router
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/v1/candidatures/{id}"),
                Some((41, "applicant")),
                Some(&json!({
                    "fiche_identite": { "projectName": "Ressourcerie du Bocage" },
                    "completion_percentage": 95,
                })),
            ))
            .await
            .expect("router dispatch");
        assert_eq!(filled.status(), StatusCode::OK);

        let submitted = router
            .clone()
            .oneshot(request(
                "POST",
                &format!("/api/v1/candidatures/{id}/submit"),
                Some((41, "applicant")),
                None,
            ))
            .await
            .expect("router dispatch");
        assert_eq!(submitted.status(), StatusCode::OK);
        let payload = json_body(submitted).await;
        assert_eq!(
            payload.pointer("/candidature/status"),
            Some(&json!("submitted"))
        );
        assert_eq!(payload.pointer("/warnings"), Some(&json!([])));

        let evaluated = router
            .clone()
            .oneshot(request(
                "POST",
                &format!("/api/v1/candidatures/{id}/evaluations"),
                Some((900, "admin")),
                Some(&evaluation_body()),
            ))
            .await
            .expect("router dispatch");
        assert_eq!(evaluated.status(), StatusCode::CREATED);
        let payload = json_body(evaluated).await;
        assert_eq!(payload.pointer("/summary/score"), Some(&json!(21)));
        assert_eq!(
            payload.pointer("/candidature/status"),
            Some(&json!("under_review"))
        );

        let decided = router
            .clone()
            .oneshot(request(
                "POST",
                &format!("/api/v1/candidatures/{id}/decision"),
                Some((900, "admin")),
                Some(&json!({ "decision": "accept" })),
            ))
            .await
            .expect("router dispatch");
        assert_eq!(decided.status(), StatusCode::OK);
        let payload = json_body(decided).await;
        assert_eq!(
            payload.pointer("/candidature/status"),
            Some(&json!("accepted"))
        );

        let statistics = router
            .oneshot(request(
                "GET",
                "/api/v1/candidatures/statistics",
                Some((900, "admin")),
                None,
            ))
            .await
            .expect("router dispatch");
        assert_eq!(statistics.status(), StatusCode::OK);
        let payload = json_body(statistics).await;
        assert_eq!(payload.get("total"), Some(&json!(1)));
        assert_eq!(payload.get("accepted"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn identity_headers_gate_every_route() {
        let router = build_router();

        let anonymous = router
            .clone()
            .oneshot(request("GET", "/api/v1/candidatures/statistics", None, None))
            .await
            .expect("router dispatch");
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let applicant = router
            .oneshot(request(
                "GET",
                "/api/v1/candidatures/statistics",
                Some((41, "applicant")),
                None,
            ))
            .await
            .expect("router dispatch");
        assert_eq!(applicant.status(), StatusCode::FORBIDDEN);
    }
}
