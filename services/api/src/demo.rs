use crate::infra::{
    FileDossierGenerator, InMemoryCandidatureRepository, LocalBoardCrm, OutboxNotifier,
};
use clap::Args;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use katapult::config::EngineConfig;
use katapult::error::AppError;
use katapult::workflows::candidature::domain::{
    Actor, AdminDecision, ApplicantContact, NewCandidature, UserId,
};
use katapult::workflows::candidature::evaluation::{
    CriterionScore, NewEvaluation, Recommendation, ScoreSheet,
};
use katapult::workflows::candidature::notify::format_french_date;
use katapult::workflows::candidature::{
    CandidatureService, CandidatureUpdate, EvaluationView, NewDocument,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Cohort assigned to the demo candidature
    #[arg(long)]
    pub(crate) promotion: Option<String>,
    /// Close the demo with a rejection instead of an acceptance
    #[arg(long)]
    pub(crate) reject: bool,
    /// Directory where the demo writes the rendered dossier
    #[arg(long, default_value = "dossiers")]
    pub(crate) dossier_dir: PathBuf,
}

fn demo_engine_config(dossier_dir: PathBuf) -> EngineConfig {
    EngineConfig {
        submission_threshold: 90,
        application_base_url: "http://localhost:3000".to_string(),
        default_promotion: "Katapult 2025".to_string(),
        effect_timeout: Duration::from_secs(10),
        dossier_dir,
    }
}

fn demo_applicant() -> ApplicantContact {
    ApplicantContact {
        first_name: "Camille".to_string(),
        last_name: "Moreau".to_string(),
        email: "camille.moreau@example.org".to_string(),
    }
}

fn demo_sections() -> CandidatureUpdate {
    CandidatureUpdate {
        fiche_identite: Some(json!({
            "projectName": "Conserverie solidaire des Vallons",
            "projectDescription": "Transformer les invendus maraîchers en conserves vendues en circuit court",
            "phone": "0231567890",
            "city": "Vire",
            "territory": "Calvados",
            "country": "France",
        })),
        projet_utilite_sociale: Some(json!({
            "sector": "Alimentation durable",
            "projectSummary": "Lutter contre le gaspillage alimentaire en valorisant les surplus agricoles du territoire.",
        })),
        modele_economique: Some(json!({
            "revenueModel": "Vente directe et ateliers de sensibilisation",
            "financialProjections": { "year1": 48000, "year2": 86000, "year3": 132000 },
        })),
        documents: Some(vec![NewDocument {
            name: "Budget prévisionnel".to_string(),
            category: "budget".to_string(),
            url: "uploads/budget-previsionnel.pdf".to_string(),
            mime_type: Some("application/pdf".to_string()),
            size_bytes: Some(182_044),
        }]),
        completion_percentage: Some(96),
        ..CandidatureUpdate::default()
    }
}

fn demo_evaluation(base: u8, recommendation: Recommendation, comment: &str) -> NewEvaluation {
    let criterion = |score: u8| CriterionScore {
        score,
        comment: None,
    };
    NewEvaluation {
        scores: ScoreSheet {
            innovation: criterion(base),
            viability: criterion(base.saturating_sub(1)),
            impact: criterion(base),
            team: criterion(base),
            alignment: criterion(base.saturating_sub(1)),
        },
        general_comment: Some(comment.to_string()),
        recommendation,
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        promotion,
        reject,
        dossier_dir,
    } = args;

    println!("Katapult candidature lifecycle demo");

    let repository = Arc::new(InMemoryCandidatureRepository::default());
    let notifier = OutboxNotifier::default();
    let board = LocalBoardCrm::default();
    let service = CandidatureService::new(
        repository,
        Arc::new(notifier.clone()),
        Arc::new(FileDossierGenerator::new(dossier_dir.clone())),
        Arc::new(board.clone()),
        demo_engine_config(dossier_dir),
    );

    let owner = Actor::applicant(UserId(101));
    let first_jury = Actor::admin(UserId(201));
    let second_jury = Actor::admin(UserId(202));

    let draft = service
        .create_candidature(
            owner,
            demo_applicant(),
            NewCandidature {
                promotion,
                ..NewCandidature::default()
            },
        )
        .await?;
    println!(
        "- Opened draft {} for {} (promotion {})",
        draft.id,
        draft.applicant.full_name(),
        draft.promotion
    );

    let filled = service
        .update_candidature(owner, draft.id, demo_sections())
        .await?;
    println!(
        "- Form filled to {}% with {} supporting document(s)",
        filled.completion_percentage,
        filled.documents.len()
    );

    let submitted = service.submit_candidature(owner, draft.id).await?;
    let candidature = &submitted.candidature;
    println!(
        "- Submitted on {} -> status {}",
        candidature
            .submission_date
            .map(format_french_date)
            .unwrap_or_default(),
        candidature.status.display_name()
    );
    if let Some(url) = &candidature.generated_pdf_url {
        println!("  Dossier rendered at {url}");
    }
    if let Some(item_id) = &candidature.monday_item_id {
        println!("  Board card created as item {item_id}");
    }
    for warning in &submitted.warnings {
        println!("  Warning ({}): {}", warning.effect.label(), warning.detail);
    }

    let first_sheet = service
        .record_evaluation(
            first_jury,
            draft.id,
            demo_evaluation(5, Recommendation::Accept, "Ancrage territorial remarquable"),
        )
        .await?;
    println!(
        "- First evaluation filed -> status {}",
        first_sheet.candidature.status.display_name()
    );

    service
        .record_evaluation(
            second_jury,
            draft.id,
            demo_evaluation(4, Recommendation::Discuss, "Modèle économique à challenger"),
        )
        .await?;

    println!("- Jury sheets:");
    let evaluations = service.evaluations(first_jury, draft.id).await?;
    for view in evaluations.iter().map(EvaluationView::of) {
        println!(
            "    evaluator {} scored {}/{} -> {}",
            view.evaluator_id, view.total, view.max_total, view.recommendation
        );
    }

    let (decision, note) = if reject {
        (
            AdminDecision::Reject,
            "Le modèle économique doit encore mûrir avant une intégration.",
        )
    } else {
        (
            AdminDecision::Accept,
            "Bienvenue dans la promotion ! L'équipe revient vers vous pour l'accueil.",
        )
    };
    let decided = service
        .apply_admin_decision(first_jury, draft.id, decision, Some(note.to_string()))
        .await?;
    println!(
        "- Decision {} -> status {}{}",
        decision.label(),
        decided.candidature.status.display_name(),
        decided
            .candidature
            .decision_date
            .map(|date| format!(" (decided {})", format_french_date(date)))
            .unwrap_or_default()
    );

    println!("- Applicant outbox:");
    for message in notifier.sent() {
        println!("    {} <- {}", message.to, message.subject);
    }

    println!("- Local board:");
    for (item_id, card) in board.items() {
        println!(
            "    item {} -> {} [{}]",
            item_id,
            card.name,
            card.status.display_name()
        );
    }

    let statistics = service.statistics(first_jury).await?;
    println!(
        "- Statistics: {} total | {} submitted | {} under review | {} accepted | {} rejected",
        statistics.total,
        statistics.submitted,
        statistics.under_review,
        statistics.accepted,
        statistics.rejected
    );

    let failures = service.failed_effects();
    if failures.is_empty() {
        println!("- Side-effect journal: empty");
    } else {
        println!("- Side-effect journal:");
        for failure in failures {
            println!(
                "    {} on candidature {}: {}",
                failure.effect.label(),
                failure.candidature_id,
                failure.detail
            );
        }
    }

    match serde_json::to_string_pretty(&decided.candidature) {
        Ok(payload) => println!("- Final record:\n{payload}"),
        Err(err) => println!("- Final record unavailable: {err}"),
    }

    Ok(())
}
