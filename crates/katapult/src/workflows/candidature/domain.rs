use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Identifier wrapper for candidatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidatureId(pub u64);

impl fmt::Display for CandidatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier wrapper for platform users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role attached to an authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Applicant,
    Admin,
}

impl UserRole {
    /// Anything that is not explicitly `admin` is treated as an applicant.
    pub fn from_label(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::Applicant
        }
    }
}

/// Authenticated identity attached to a workflow call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Actor {
    pub const fn applicant(user_id: UserId) -> Self {
        Self {
            user_id,
            role: UserRole::Applicant,
        }
    }

    pub const fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: UserRole::Admin,
        }
    }

    pub const fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }
}

/// Contact details of the applicant, captured when the candidature is opened
/// so outbound email and the CRM card never need a user lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantContact {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl ApplicantContact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Review pipeline status of a candidature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatureStatus {
    Draft,
    Submitted,
    UnderReview,
    Shortlisted,
    Accepted,
    Rejected,
}

impl CandidatureStatus {
    pub const ALL: [CandidatureStatus; 6] = [
        CandidatureStatus::Draft,
        CandidatureStatus::Submitted,
        CandidatureStatus::UnderReview,
        CandidatureStatus::Shortlisted,
        CandidatureStatus::Accepted,
        CandidatureStatus::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            CandidatureStatus::Draft => "draft",
            CandidatureStatus::Submitted => "submitted",
            CandidatureStatus::UnderReview => "under_review",
            CandidatureStatus::Shortlisted => "shortlisted",
            CandidatureStatus::Accepted => "accepted",
            CandidatureStatus::Rejected => "rejected",
        }
    }

    /// French label shown to applicants and pushed to the CRM board.
    pub const fn display_name(self) -> &'static str {
        match self {
            CandidatureStatus::Draft => "Brouillon",
            CandidatureStatus::Submitted => "Soumise",
            CandidatureStatus::UnderReview => "En cours d'évaluation",
            CandidatureStatus::Shortlisted => "Présélectionnée",
            CandidatureStatus::Accepted => "Acceptée",
            CandidatureStatus::Rejected => "Refusée",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.label() == value.trim())
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, CandidatureStatus::Accepted | CandidatureStatus::Rejected)
    }

    /// The finite transition graph. Everything outside it is rejected.
    pub const fn can_transition_to(self, next: CandidatureStatus) -> bool {
        matches!(
            (self, next),
            (CandidatureStatus::Draft, CandidatureStatus::Submitted)
                | (CandidatureStatus::Submitted, CandidatureStatus::UnderReview)
                | (CandidatureStatus::Submitted, CandidatureStatus::Draft)
                | (CandidatureStatus::UnderReview, CandidatureStatus::Shortlisted)
                | (CandidatureStatus::UnderReview, CandidatureStatus::Accepted)
                | (CandidatureStatus::UnderReview, CandidatureStatus::Rejected)
                | (CandidatureStatus::UnderReview, CandidatureStatus::Draft)
                | (CandidatureStatus::Shortlisted, CandidatureStatus::UnderReview)
                | (CandidatureStatus::Shortlisted, CandidatureStatus::Accepted)
                | (CandidatureStatus::Shortlisted, CandidatureStatus::Rejected)
                | (CandidatureStatus::Shortlisted, CandidatureStatus::Draft)
        )
    }
}

/// The seven structured form sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    FicheIdentite,
    ProjetUtiliteSociale,
    QuiEstConcerne,
    ModeleEconomique,
    PartiesPrenantes,
    EquipeProjet,
    StructureJuridique,
}

impl SectionKey {
    pub const ALL: [SectionKey; 7] = [
        SectionKey::FicheIdentite,
        SectionKey::ProjetUtiliteSociale,
        SectionKey::QuiEstConcerne,
        SectionKey::ModeleEconomique,
        SectionKey::PartiesPrenantes,
        SectionKey::EquipeProjet,
        SectionKey::StructureJuridique,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            SectionKey::FicheIdentite => "fiche_identite",
            SectionKey::ProjetUtiliteSociale => "projet_utilite_sociale",
            SectionKey::QuiEstConcerne => "qui_est_concerne",
            SectionKey::ModeleEconomique => "modele_economique",
            SectionKey::PartiesPrenantes => "parties_prenantes",
            SectionKey::EquipeProjet => "equipe_projet",
            SectionKey::StructureJuridique => "structure_juridique",
        }
    }

    /// Heading used when the section is rendered into the dossier.
    pub const fn display_name(self) -> &'static str {
        match self {
            SectionKey::FicheIdentite => "Fiche d'identité",
            SectionKey::ProjetUtiliteSociale => "Projet et utilité sociale",
            SectionKey::QuiEstConcerne => "Qui est concerné",
            SectionKey::ModeleEconomique => "Modèle économique",
            SectionKey::PartiesPrenantes => "Parties prenantes",
            SectionKey::EquipeProjet => "Équipe projet",
            SectionKey::StructureJuridique => "Structure juridique",
        }
    }
}

/// Section documents as stored on the aggregate. Values are opaque to the
/// engine apart from the team reference phone lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sections {
    pub fiche_identite: Value,
    pub projet_utilite_sociale: Value,
    pub qui_est_concerne: Value,
    pub modele_economique: Value,
    pub parties_prenantes: Value,
    pub equipe_projet: Value,
    pub structure_juridique: Value,
}

impl Default for Sections {
    fn default() -> Self {
        Self {
            fiche_identite: json!({}),
            projet_utilite_sociale: json!({}),
            qui_est_concerne: json!({}),
            modele_economique: json!({}),
            parties_prenantes: json!({}),
            equipe_projet: json!({}),
            structure_juridique: json!({}),
        }
    }
}

impl Sections {
    /// Pre-filled shapes a fresh candidature starts from, so the form client
    /// always finds every field it binds to.
    pub fn seeded() -> Self {
        Self {
            fiche_identite: json!({
                "callSource": "",
                "callSourceOther": "",
                "phone": "",
                "street": "",
                "city": "",
                "postalCode": "",
                "country": "France",
                "currentSituation": "",
                "currentSituationOther": "",
                "projectName": "",
                "projectDescription": "",
            }),
            projet_utilite_sociale: json!({
                "sector": "",
                "sectorOther": "",
                "maturityLevel": "",
                "startDate": null,
                "implementationArea": "",
                "interventionArea": "",
                "problemStatement": "",
                "solutionDescription": "",
            }),
            qui_est_concerne: json!({
                "beneficiaries": [],
                "targetGroups": [],
                "impactDescription": "",
                "measurableImpacts": [],
            }),
            modele_economique: json!({
                "economicModel": "",
                "revenueStructure": [],
                "fundingSources": [],
                "financialProjections": {
                    "year1": { "revenues": 0, "expenses": 0, "result": 0 },
                    "year2": { "revenues": 0, "expenses": 0, "result": 0 },
                    "year3": { "revenues": 0, "expenses": 0, "result": 0 },
                },
            }),
            parties_prenantes: json!({
                "partners": [],
                "competitors": [],
                "stakeholders": [],
            }),
            equipe_projet: json!({
                "members": [],
            }),
            structure_juridique: json!({
                "hasExistingStructure": false,
                "structureName": "",
                "structureStatus": "",
                "structureCreationDate": "",
                "structureContext": "",
            }),
        }
    }

    pub fn get(&self, key: SectionKey) -> &Value {
        match key {
            SectionKey::FicheIdentite => &self.fiche_identite,
            SectionKey::ProjetUtiliteSociale => &self.projet_utilite_sociale,
            SectionKey::QuiEstConcerne => &self.qui_est_concerne,
            SectionKey::ModeleEconomique => &self.modele_economique,
            SectionKey::PartiesPrenantes => &self.parties_prenantes,
            SectionKey::EquipeProjet => &self.equipe_projet,
            SectionKey::StructureJuridique => &self.structure_juridique,
        }
    }

    pub fn get_mut(&mut self, key: SectionKey) -> &mut Value {
        match key {
            SectionKey::FicheIdentite => &mut self.fiche_identite,
            SectionKey::ProjetUtiliteSociale => &mut self.projet_utilite_sociale,
            SectionKey::QuiEstConcerne => &mut self.qui_est_concerne,
            SectionKey::ModeleEconomique => &mut self.modele_economique,
            SectionKey::PartiesPrenantes => &mut self.parties_prenantes,
            SectionKey::EquipeProjet => &mut self.equipe_projet,
            SectionKey::StructureJuridique => &mut self.structure_juridique,
        }
    }

    /// Reference contact phone nested in the team section, when present.
    pub fn reference_phone(&self) -> Option<&str> {
        self.equipe_projet
            .get("reference")
            .and_then(|reference| reference.get("telephone"))
            .and_then(Value::as_str)
            .filter(|phone| !phone.is_empty())
    }

    /// Applicant-facing project name from the identity sheet, when filled in.
    pub fn project_name(&self) -> Option<&str> {
        self.fiche_identite
            .get("projectName")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Contact phone from the identity sheet, when filled in.
    pub fn contact_phone(&self) -> Option<&str> {
        self.fiche_identite
            .get("phone")
            .and_then(Value::as_str)
            .filter(|phone| !phone.is_empty())
    }
}

/// Metadata for an uploaded supporting document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub category: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub uploaded_at: DateTime<Utc>,
}

/// Per-section completeness reported by the form client alongside its edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionFlags {
    pub fiche_identite: bool,
    pub projet_utilite_sociale: bool,
    pub qui_est_concerne: bool,
    pub modele_economique: bool,
    pub parties_prenantes: bool,
    pub equipe_projet: bool,
    pub documents: bool,
}

impl CompletionFlags {
    pub const TOTAL: u8 = 7;

    pub const fn set_count(self) -> u8 {
        self.fiche_identite as u8
            + self.projet_utilite_sociale as u8
            + self.qui_est_concerne as u8
            + self.modele_economique as u8
            + self.parties_prenantes as u8
            + self.equipe_projet as u8
            + self.documents as u8
    }
}

/// Percentage derived from the section flags, rounded to the nearest integer.
///
/// The client-supplied `completion_percentage` stays canonical for the
/// submission gate; this derivation exists to audit what the client reports.
pub fn completion_from_flags(flags: CompletionFlags) -> u8 {
    let ratio = f64::from(flags.set_count()) * 100.0 / f64::from(CompletionFlags::TOTAL);
    ratio.round() as u8
}

/// A single incubator application and everything the review process tracks
/// on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidature {
    pub id: CandidatureId,
    pub user_id: UserId,
    pub applicant: ApplicantContact,
    pub promotion: String,
    pub status: CandidatureStatus,
    pub phone: String,
    pub sections: Sections,
    pub documents: Vec<Document>,
    pub completion_flags: CompletionFlags,
    pub completion_percentage: u8,
    pub submission_date: Option<DateTime<Utc>>,
    pub decision_date: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub generated_pdf_url: Option<String>,
    pub monday_item_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidature {
    /// Name shown on emails, the dossier, and the CRM card.
    pub fn display_name(&self) -> String {
        match self.sections.project_name() {
            Some(name) => name.to_string(),
            None => format!("Candidature {}", self.id),
        }
    }

    /// Best-known contact phone: explicit top-level value first, then the
    /// identity sheet.
    pub fn best_phone(&self) -> Option<&str> {
        if !self.phone.is_empty() {
            return Some(self.phone.as_str());
        }
        self.sections.contact_phone()
    }

    /// Capability check for section edits. Owners may edit while drafting;
    /// administrators may edit at any stage.
    pub fn editable_by(&self, actor: &Actor) -> bool {
        if actor.is_admin() {
            return true;
        }
        actor.user_id == self.user_id && self.status == CandidatureStatus::Draft
    }
}

/// Fields accepted when opening a candidature. Sections not supplied start
/// from [`Sections::seeded`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewCandidature {
    pub promotion: Option<String>,
    pub phone: Option<String>,
    pub sections: Option<Sections>,
    pub completion_flags: Option<CompletionFlags>,
}

/// Administrative actions that move a candidature through review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminDecision {
    Shortlist,
    ResumeReview,
    Accept,
    Reject,
    ReturnToDraft,
}

impl AdminDecision {
    pub const fn target_status(self) -> CandidatureStatus {
        match self {
            AdminDecision::Shortlist => CandidatureStatus::Shortlisted,
            AdminDecision::ResumeReview => CandidatureStatus::UnderReview,
            AdminDecision::Accept => CandidatureStatus::Accepted,
            AdminDecision::Reject => CandidatureStatus::Rejected,
            AdminDecision::ReturnToDraft => CandidatureStatus::Draft,
        }
    }

    /// Template dispatched for the transition. Shortlist toggles move the
    /// board without notifying the applicant.
    pub const fn email_template(self) -> Option<&'static str> {
        match self {
            AdminDecision::Accept => Some("application_status_accepted"),
            AdminDecision::Reject => Some("application_status_rejected"),
            AdminDecision::ReturnToDraft => Some("application_status_draft_return"),
            AdminDecision::Shortlist | AdminDecision::ResumeReview => None,
        }
    }

    /// Whether the decision stamps `decision_date` on the record.
    pub const fn is_final(self) -> bool {
        matches!(self, AdminDecision::Accept | AdminDecision::Reject)
    }

    pub const fn label(self) -> &'static str {
        match self {
            AdminDecision::Shortlist => "shortlist",
            AdminDecision::ResumeReview => "resume_review",
            AdminDecision::Accept => "accept",
            AdminDecision::Reject => "reject",
            AdminDecision::ReturnToDraft => "return_to_draft",
        }
    }
}

