//! Dossier rendering for submitted candidatures.
//!
//! The engine renders a self-contained HTML document from the section data;
//! a [`DossierGenerator`] stores it somewhere durable and answers with the
//! URL persisted on the record.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::domain::{Candidature, SectionKey};
use super::notify::format_french_date;

/// Trait describing the dossier persistence hook.
#[async_trait]
pub trait DossierGenerator: Send + Sync {
    /// Stores a rendered dossier and returns its URL.
    async fn generate(&self, candidature: &Candidature) -> Result<String, DossierError>;
}

/// Dossier generation error.
#[derive(Debug, thiserror::Error)]
pub enum DossierError {
    #[error("dossier storage unavailable: {0}")]
    Storage(String),
}

/// Renders the dossier document for a candidature.
pub fn render_dossier_html(candidature: &Candidature) -> String {
    let mut html = String::new();

    writeln!(html, "<h1>Dossier de candidature</h1>").expect("title heading");
    writeln!(
        html,
        "<h2>Projet : {}</h2>",
        escape_html(&candidature.display_name())
    )
    .expect("project heading");

    let submitted = match candidature.submission_date {
        Some(date) => format_french_date(date),
        None => "Non soumise".to_string(),
    };
    writeln!(html, "<p>Date de soumission : {}</p>", escape_html(&submitted))
        .expect("submission line");
    writeln!(
        html,
        "<p>Statut : {}</p>",
        candidature.status.display_name()
    )
    .expect("status line");

    writeln!(html, "<h3>Informations sur le programme</h3>").expect("program heading");
    writeln!(
        html,
        "<p>Promotion : {}</p>",
        escape_html(&candidature.promotion)
    )
    .expect("promotion line");

    writeln!(html, "<h3>Informations personnelles</h3>").expect("personal heading");
    writeln!(
        html,
        "<p>Nom : {}</p>",
        escape_html(&candidature.applicant.last_name)
    )
    .expect("last name line");
    writeln!(
        html,
        "<p>Prénom : {}</p>",
        escape_html(&candidature.applicant.first_name)
    )
    .expect("first name line");
    writeln!(
        html,
        "<p>Email : {}</p>",
        escape_html(&candidature.applicant.email)
    )
    .expect("email line");
    writeln!(
        html,
        "<p>Téléphone : {}</p>",
        escape_html(candidature.best_phone().unwrap_or(""))
    )
    .expect("phone line");

    for key in SectionKey::ALL {
        writeln!(html, "<h3>{}</h3>", key.display_name()).expect("section heading");
        render_value(&mut html, candidature.sections.get(key));
    }

    if !candidature.documents.is_empty() {
        writeln!(html, "<h3>Documents</h3>").expect("documents heading");
        html.push_str("<ul>");
        for document in &candidature.documents {
            writeln!(
                html,
                "<li><a href=\"{}\">{}</a> ({})</li>",
                escape_html(&document.url),
                escape_html(&document.name),
                escape_html(&document.category)
            )
            .expect("document item");
        }
        html.push_str("</ul>\n");
    }

    writeln!(
        html,
        "<p><em>Document généré automatiquement par la plateforme Katapult le {}</em></p>",
        Utc::now().format("%d/%m/%Y %H:%M")
    )
    .expect("generation footer");

    html
}

/// Renders one JSON value as HTML. Objects become definition lists, arrays
/// become bullet lists, scalars become paragraphs.
fn render_value(html: &mut String, value: &Value) {
    match value {
        Value::Object(map) if map.is_empty() => {
            html.push_str("<p>Non renseigné</p>\n");
        }
        Value::Object(map) => {
            html.push_str("<dl>");
            for (key, entry) in map {
                write!(html, "<dt>{}</dt><dd>", escape_html(key)).expect("definition term");
                render_entry(html, entry);
                html.push_str("</dd>");
            }
            html.push_str("</dl>\n");
        }
        Value::Array(items) if items.is_empty() => {
            html.push_str("<p>Non renseigné</p>\n");
        }
        Value::Array(items) => {
            html.push_str("<ul>");
            for item in items {
                html.push_str("<li>");
                render_entry(html, item);
                html.push_str("</li>");
            }
            html.push_str("</ul>\n");
        }
        scalar => {
            writeln!(html, "<p>{}</p>", escape_html(&scalar_text(scalar))).expect("scalar line");
        }
    }
}

/// Inline rendering used inside list and definition entries.
fn render_entry(html: &mut String, value: &Value) {
    match value {
        Value::Object(_) | Value::Array(_) => render_value(html, value),
        scalar => html.push_str(&escape_html(&scalar_text(scalar))),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "Non renseigné".to_string(),
        Value::String(text) if text.is_empty() => "Non renseigné".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
