//! Patch semantics for the candidature record.
//!
//! A partial update replaces any supplied section wholesale, appends supplied
//! documents to the existing collection, and leaves absent keys untouched.
//! Team edits re-derive the top-level contact phone from the nested reference
//! contact.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::domain::{Candidature, CandidatureStatus, CompletionFlags, Document, SectionKey};

/// Wire payload for a partial candidature update.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CandidatureUpdate {
    pub promotion: Option<String>,
    pub phone: Option<String>,
    pub fiche_identite: Option<Value>,
    pub projet_utilite_sociale: Option<Value>,
    pub qui_est_concerne: Option<Value>,
    pub modele_economique: Option<Value>,
    pub parties_prenantes: Option<Value>,
    pub equipe_projet: Option<Value>,
    pub structure_juridique: Option<Value>,
    pub documents: Option<Vec<NewDocument>>,
    pub completion_flags: Option<CompletionFlagsPatch>,
    pub completion_percentage: Option<u8>,
}

impl CandidatureUpdate {
    pub fn section(&self, key: SectionKey) -> Option<&Value> {
        match key {
            SectionKey::FicheIdentite => self.fiche_identite.as_ref(),
            SectionKey::ProjetUtiliteSociale => self.projet_utilite_sociale.as_ref(),
            SectionKey::QuiEstConcerne => self.qui_est_concerne.as_ref(),
            SectionKey::ModeleEconomique => self.modele_economique.as_ref(),
            SectionKey::PartiesPrenantes => self.parties_prenantes.as_ref(),
            SectionKey::EquipeProjet => self.equipe_projet.as_ref(),
            SectionKey::StructureJuridique => self.structure_juridique.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.promotion.is_none()
            && self.phone.is_none()
            && SectionKey::ALL.iter().all(|key| self.section(*key).is_none())
            && self.documents.is_none()
            && self.completion_flags.is_none()
            && self.completion_percentage.is_none()
    }

    /// Folds the payload into the change set a repository applies. The
    /// current record supplies the flag baseline for partial flag patches.
    pub fn into_changes(
        self,
        current: &Candidature,
        now: DateTime<Utc>,
    ) -> Result<CandidatureChanges, SectionPatchError> {
        let CandidatureUpdate {
            promotion,
            phone,
            fiche_identite,
            projet_utilite_sociale,
            qui_est_concerne,
            modele_economique,
            parties_prenantes,
            equipe_projet,
            structure_juridique,
            documents,
            completion_flags,
            completion_percentage,
        } = self;

        if let Some(percentage) = completion_percentage {
            if percentage > 100 {
                return Err(SectionPatchError::PercentageOutOfRange(percentage));
            }
        }

        let mut changes = CandidatureChanges::default();

        // Empty strings behave like absent keys, so a form client echoing
        // blank inputs cannot wipe stored values.
        changes.promotion = promotion.filter(|value| !value.is_empty());
        changes.phone = phone.filter(|value| !value.is_empty());

        let supplied = [
            (SectionKey::FicheIdentite, fiche_identite),
            (SectionKey::ProjetUtiliteSociale, projet_utilite_sociale),
            (SectionKey::QuiEstConcerne, qui_est_concerne),
            (SectionKey::ModeleEconomique, modele_economique),
            (SectionKey::PartiesPrenantes, parties_prenantes),
            (SectionKey::EquipeProjet, equipe_projet),
            (SectionKey::StructureJuridique, structure_juridique),
        ];

        for (key, value) in supplied {
            let Some(value) = value else { continue };
            if !value.is_object() {
                return Err(SectionPatchError::MalformedSection(key.label()));
            }

            // A team edit carries the reference contact whose phone becomes
            // the record-level number, unless the payload set one explicitly.
            if key == SectionKey::EquipeProjet && changes.phone.is_none() {
                if let Some(derived) = reference_phone_of(&value) {
                    changes.phone = Some(derived.to_string());
                }
            }

            changes.sections.push((key, value));
        }

        if let Some(entries) = documents {
            for entry in entries {
                if entry.name.trim().is_empty() {
                    return Err(SectionPatchError::IncompleteDocument("name"));
                }
                if entry.url.trim().is_empty() {
                    return Err(SectionPatchError::IncompleteDocument("url"));
                }
                changes.documents.push(Document {
                    name: entry.name,
                    category: entry.category,
                    url: entry.url,
                    mime_type: entry.mime_type,
                    size_bytes: entry.size_bytes,
                    uploaded_at: now,
                });
            }
        }

        if let Some(patch) = completion_flags {
            changes.completion_flags = Some(patch.apply_to(current.completion_flags));
        }
        changes.completion_percentage = completion_percentage;

        Ok(changes)
    }
}

fn reference_phone_of(team: &Value) -> Option<&str> {
    team.get("reference")
        .and_then(|reference| reference.get("telephone"))
        .and_then(Value::as_str)
        .filter(|phone| !phone.is_empty())
}

/// Document entry supplied by the client. The engine stamps the upload time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDocument {
    pub name: String,
    #[serde(default = "default_document_category")]
    pub category: String,
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

fn default_document_category() -> String {
    "autre".to_string()
}

/// Per-flag patch; only supplied flags change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompletionFlagsPatch {
    pub fiche_identite: Option<bool>,
    pub projet_utilite_sociale: Option<bool>,
    pub qui_est_concerne: Option<bool>,
    pub modele_economique: Option<bool>,
    pub parties_prenantes: Option<bool>,
    pub equipe_projet: Option<bool>,
    pub documents: Option<bool>,
}

impl CompletionFlagsPatch {
    pub fn apply_to(self, mut flags: CompletionFlags) -> CompletionFlags {
        if let Some(value) = self.fiche_identite {
            flags.fiche_identite = value;
        }
        if let Some(value) = self.projet_utilite_sociale {
            flags.projet_utilite_sociale = value;
        }
        if let Some(value) = self.qui_est_concerne {
            flags.qui_est_concerne = value;
        }
        if let Some(value) = self.modele_economique {
            flags.modele_economique = value;
        }
        if let Some(value) = self.parties_prenantes {
            flags.parties_prenantes = value;
        }
        if let Some(value) = self.equipe_projet {
            flags.equipe_projet = value;
        }
        if let Some(value) = self.documents {
            flags.documents = value;
        }
        flags
    }
}

/// Validation failures raised while folding an update payload.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SectionPatchError {
    #[error("completion_percentage must be between 0 and 100, got {0}")]
    PercentageOutOfRange(u8),
    #[error("document entries require a non-empty {0}")]
    IncompleteDocument(&'static str),
    #[error("section {0} must be a JSON object")]
    MalformedSection(&'static str),
}

/// Normalized change set applied to a stored candidature. Produced either
/// from a client payload via [`CandidatureUpdate::into_changes`] or directly
/// by the engine for status moves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatureChanges {
    pub promotion: Option<String>,
    pub phone: Option<String>,
    pub sections: Vec<(SectionKey, Value)>,
    pub documents: Vec<Document>,
    pub completion_flags: Option<CompletionFlags>,
    pub completion_percentage: Option<u8>,
    pub status: Option<CandidatureStatus>,
    pub submission_date: Option<DateTime<Utc>>,
    pub decision_date: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub generated_pdf_url: Option<String>,
    pub monday_item_id: Option<String>,
}

impl CandidatureChanges {
    pub fn status_change(status: CandidatureStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the change set in place and stamps `updated_at`. Sections are
    /// replaced wholesale; documents are appended.
    pub fn apply_to(&self, candidature: &mut Candidature, now: DateTime<Utc>) {
        if let Some(promotion) = &self.promotion {
            candidature.promotion = promotion.clone();
        }
        if let Some(phone) = &self.phone {
            candidature.phone = phone.clone();
        }
        for (key, value) in &self.sections {
            *candidature.sections.get_mut(*key) = value.clone();
        }
        candidature
            .documents
            .extend(self.documents.iter().cloned());
        if let Some(flags) = self.completion_flags {
            candidature.completion_flags = flags;
        }
        if let Some(percentage) = self.completion_percentage {
            candidature.completion_percentage = percentage;
        }
        if let Some(status) = self.status {
            candidature.status = status;
        }
        if let Some(date) = self.submission_date {
            candidature.submission_date = Some(date);
        }
        if let Some(date) = self.decision_date {
            candidature.decision_date = Some(date);
        }
        if let Some(notes) = &self.admin_notes {
            candidature.admin_notes = Some(notes.clone());
        }
        if let Some(url) = &self.generated_pdf_url {
            candidature.generated_pdf_url = Some(url.clone());
        }
        if let Some(item_id) = &self.monday_item_id {
            candidature.monday_item_id = Some(item_id.clone());
        }
        candidature.updated_at = now;
    }
}
