//! CRM board synchronization.
//!
//! Candidatures mirror onto a Monday.com board: one card per candidature,
//! created on the first sync and updated in place afterwards. The board's
//! column identifiers live in [`CrmFieldMapping`] so a board revision only
//! touches the mapping, never the client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::MondaySettings;

use super::domain::{Candidature, CandidatureStatus};

/// Flattened card content pushed to the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatureCard {
    pub name: String,
    pub status: CandidatureStatus,
    pub porter_name: String,
    pub porter_email: String,
    pub phone: String,
    pub short_description: String,
    pub sector: String,
    pub location: String,
    pub submission_date: Option<DateTime<Utc>>,
    pub promotion: String,
}

impl CandidatureCard {
    /// Assembles the card from the record, falling back through the section
    /// data the way the board expects.
    pub fn of(candidature: &Candidature) -> Self {
        let social = &candidature.sections.projet_utilite_sociale;
        let identity = &candidature.sections.fiche_identite;

        let short_description = string_at(social, "shortDescription")
            .or_else(|| string_at(social, "projectSummary").map(|text| truncate(&text, 100)))
            .unwrap_or_else(|| "Pas de description".to_string());

        let sector = string_at(identity, "sector")
            .or_else(|| string_at(social, "sector"))
            .unwrap_or_default();

        let location = string_at(identity, "territory")
            .or_else(|| string_at(identity, "city"))
            .unwrap_or_else(|| "Non spécifié".to_string());

        Self {
            name: candidature.display_name(),
            status: candidature.status,
            porter_name: candidature.applicant.full_name(),
            porter_email: candidature.applicant.email.clone(),
            phone: candidature.best_phone().unwrap_or_default().to_string(),
            short_description,
            sector,
            location,
            submission_date: candidature.submission_date,
            promotion: candidature.promotion.clone(),
        }
    }
}

fn string_at(section: &Value, key: &str) -> Option<String> {
    section
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Column identifiers of the target board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmFieldMapping {
    pub status: String,
    pub submission_date: String,
    pub porter_name: String,
    pub short_description: String,
    pub location: String,
    pub email: String,
    pub phone: String,
    pub sector: String,
}

impl Default for CrmFieldMapping {
    /// Mapping for the current board revision.
    fn default() -> Self {
        Self {
            status: "status".to_string(),
            submission_date: "date4".to_string(),
            porter_name: "text".to_string(),
            short_description: "text9".to_string(),
            location: "text8".to_string(),
            email: "email".to_string(),
            phone: "phone".to_string(),
            sector: "text6".to_string(),
        }
    }
}

/// Trait describing the CRM board hook. Create and update are mutually
/// exclusive per sync: callers create when no external id is stored yet and
/// update otherwise.
#[async_trait]
pub trait CrmSync: Send + Sync {
    /// Creates a card and returns the external item id.
    async fn create(&self, card: &CandidatureCard) -> Result<String, CrmError>;

    /// Updates the card behind an existing external id.
    async fn update(&self, item_id: &str, card: &CandidatureCard) -> Result<(), CrmError>;
}

/// CRM dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("CRM transport failure: {0}")]
    Transport(String),
    #[error("CRM rejected the request: {0}")]
    Api(String),
}

/// GraphQL client for the Monday.com v2 API.
pub struct MondayBoardClient {
    http: reqwest::Client,
    settings: MondaySettings,
    mapping: CrmFieldMapping,
}

impl MondayBoardClient {
    pub fn new(settings: MondaySettings, mapping: CrmFieldMapping) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            mapping,
        }
    }

    fn board_id(&self) -> Result<i64, CrmError> {
        self.settings
            .board_id
            .trim()
            .parse::<i64>()
            .map_err(|_| CrmError::Api("MONDAY_BOARD_ID must be numeric".to_string()))
    }

    fn column_values(&self, card: &CandidatureCard) -> Value {
        let mapping = &self.mapping;
        let mut values = serde_json::Map::new();

        values.insert(
            mapping.status.clone(),
            json!({ "label": card.status.display_name() }),
        );
        if let Some(date) = card.submission_date {
            values.insert(
                mapping.submission_date.clone(),
                json!({ "date": date.format("%Y-%m-%d").to_string() }),
            );
        }
        values.insert(mapping.porter_name.clone(), json!(clean_text(&card.porter_name)));
        values.insert(
            mapping.short_description.clone(),
            json!(clean_text(&card.short_description)),
        );
        values.insert(mapping.location.clone(), json!(clean_text(&card.location)));
        if !card.porter_email.is_empty() {
            values.insert(
                mapping.email.clone(),
                json!({ "email": card.porter_email, "text": card.porter_email }),
            );
        }
        if !card.phone.is_empty() {
            values.insert(
                mapping.phone.clone(),
                json!({ "phone": card.phone, "countryShortName": "FR" }),
            );
        }
        values.insert(mapping.sector.clone(), json!(clean_text(&card.sector)));

        Value::Object(values)
    }

    /// The API wants `column_values` as an escaped JSON string literal
    /// inside the mutation text.
    fn column_values_literal(&self, card: &CandidatureCard) -> Result<String, CrmError> {
        let rendered = serde_json::to_string(&self.column_values(card))
            .map_err(|err| CrmError::Api(err.to_string()))?;
        serde_json::to_string(&rendered).map_err(|err| CrmError::Api(err.to_string()))
    }

    async fn execute(&self, query: String) -> Result<Value, CrmError> {
        let response = self
            .http
            .post(&self.settings.api_url)
            .header(AUTHORIZATION, self.settings.api_token.as_str())
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|err| CrmError::Transport(err.to_string()))?
            .error_for_status()
            .map_err(|err| CrmError::Transport(err.to_string()))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|err| CrmError::Transport(err.to_string()))?;

        if let Some(errors) = payload.get("errors") {
            let is_empty = errors.as_array().map(Vec::is_empty).unwrap_or(false);
            if !errors.is_null() && !is_empty {
                return Err(CrmError::Api(errors.to_string()));
            }
        }

        Ok(payload)
    }
}

#[async_trait]
impl CrmSync for MondayBoardClient {
    async fn create(&self, card: &CandidatureCard) -> Result<String, CrmError> {
        let board_id = self.board_id()?;
        let item_name = serde_json::to_string(&card.name)
            .map_err(|err| CrmError::Api(err.to_string()))?;
        let column_values = self.column_values_literal(card)?;

        let query = format!(
            "mutation {{ create_item(board_id: {board_id}, item_name: {item_name}, \
             column_values: {column_values}) {{ id }} }}"
        );

        let payload = self.execute(query).await?;
        let item = payload
            .get("data")
            .and_then(|data| data.get("create_item"))
            .and_then(|item| item.get("id"));

        match item {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(CrmError::Api("unexpected create_item response".to_string())),
        }
    }

    async fn update(&self, item_id: &str, card: &CandidatureCard) -> Result<(), CrmError> {
        let board_id = self.board_id()?;
        let item_id: i64 = item_id
            .trim()
            .parse()
            .map_err(|_| CrmError::Api("stored CRM item id must be numeric".to_string()))?;
        let column_values = self.column_values_literal(card)?;

        let query = format!(
            "mutation {{ change_multiple_column_values(item_id: {item_id}, \
             board_id: {board_id}, column_values: {column_values}) {{ id }} }}"
        );
        self.execute(query).await?;

        // Card titles live on the item itself, not in a column. A rename
        // failure is not worth failing the sync over.
        let new_name = serde_json::to_string(&card.name)
            .map_err(|err| CrmError::Api(err.to_string()))?;
        let rename = format!(
            "mutation {{ change_item_name(item_id: {item_id}, board_id: {board_id}, \
             new_name: {new_name}) {{ id name }} }}"
        );
        if let Err(err) = self.execute(rename).await {
            warn!(item_id, error = %err, "CRM item rename failed");
        }

        Ok(())
    }
}

fn clean_text(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\r' => None,
            '\n' | '\t' => Some(' '),
            other => Some(other),
        })
        .take(100)
        .collect()
}
