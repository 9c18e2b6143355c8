//! Outbound applicant email.
//!
//! Templates are held in an in-process catalog seeded with the platform's
//! stock messages. Rendering substitutes `{{key}}` placeholders, resolves
//! `{{#if adminNotes}}` blocks, and wraps the result in the shared layout.
//! A missing template is logged and skipped, never surfaced to the caller.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{Candidature, CandidatureStatus};

/// Rendered message handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Trait describing the outbound email hook.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError>;
}

/// Notifier dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier transport unavailable: {0}")]
    Transport(String),
}

/// Fixed status-to-template mapping for transition emails. Shortlisting is
/// internal triage and never emails the applicant.
pub fn template_for_status(status: CandidatureStatus) -> Option<&'static str> {
    match status {
        CandidatureStatus::Submitted => Some("application_status_submitted"),
        CandidatureStatus::UnderReview => Some("application_status_review"),
        CandidatureStatus::Accepted => Some("application_status_accepted"),
        CandidatureStatus::Rejected => Some("application_status_rejected"),
        CandidatureStatus::Draft => Some("application_status_draft_return"),
        CandidatureStatus::Shortlisted => None,
    }
}

pub fn format_french_date(date: DateTime<Utc>) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Values substituted into a template. Field names follow the record; the
/// placeholder keys the catalog uses are camelCase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateData {
    pub first_name: String,
    pub last_name: String,
    pub application_name: String,
    pub application_link: String,
    pub status_label: String,
    pub submission_date: Option<String>,
    pub admin_notes: Option<String>,
}

impl TemplateData {
    /// Assembles the data a transition email needs from the current record.
    pub fn for_candidature(
        candidature: &Candidature,
        base_url: &str,
        admin_notes: Option<&str>,
    ) -> Self {
        Self {
            first_name: candidature.applicant.first_name.clone(),
            last_name: candidature.applicant.last_name.clone(),
            application_name: candidature.display_name(),
            application_link: format!("{base_url}/candidatures/{}", candidature.id),
            status_label: candidature.status.display_name().to_string(),
            submission_date: candidature.submission_date.map(format_french_date),
            admin_notes: admin_notes
                .map(str::to_string)
                .filter(|notes| !notes.trim().is_empty()),
        }
    }

    fn pairs(&self) -> [(&'static str, &str); 7] {
        [
            ("firstName", self.first_name.as_str()),
            ("lastName", self.last_name.as_str()),
            ("applicationName", self.application_name.as_str()),
            ("applicationLink", self.application_link.as_str()),
            ("statusLabel", self.status_label.as_str()),
            ("submissionDate", self.submission_date.as_deref().unwrap_or("")),
            ("adminNotes", self.admin_notes.as_deref().unwrap_or("")),
        ]
    }
}

/// Named email template: subject and HTML body, both carrying placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,
}

/// Subject and final HTML produced for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// In-process catalog of applicant-facing templates.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: HashMap<String, EmailTemplate>,
}

impl TemplateCatalog {
    /// Catalog with no entries, for exercising the missing-template path.
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, template: EmailTemplate) {
        self.templates.insert(name.into(), template);
    }

    pub fn get(&self, name: &str) -> Option<&EmailTemplate> {
        self.templates.get(name)
    }

    /// Renders a template. `None` means the catalog has no such template;
    /// the dispatcher logs that case and carries on.
    pub fn render(&self, name: &str, data: &TemplateData) -> Option<RenderedEmail> {
        let template = self.templates.get(name)?;

        let subject = substitute(&template.subject, data);
        let body = resolve_conditional(&template.body, "adminNotes", data.admin_notes.is_some());
        let body = substitute(&body, data);

        Some(RenderedEmail {
            body: wrap_in_layout(&subject, &body),
            subject,
        })
    }

    /// The stock catalog shipped with the platform.
    pub fn seeded() -> Self {
        let mut catalog = Self::empty();

        catalog.insert(
            "submission_confirmation",
            EmailTemplate {
                subject: "Confirmation de soumission de votre candidature {{applicationName}}"
                    .to_string(),
                body: r#"<h1 style="font-size: 22px; color: #0d2d5e; margin-top: 0; margin-bottom: 20px;">Confirmation de soumission</h1>
<p>Bonjour {{firstName}} {{lastName}},</p>
<p>Nous vous confirmons la bonne réception de votre candidature "<strong>{{applicationName}}</strong>".</p>
<p>Elle a été soumise le {{submissionDate}}.</p>
<p>Vous pouvez suivre son avancement et la consulter à tout moment via le lien ci-dessous :</p>
<p style="text-align: center; margin-bottom: 30px;">
  <a href="{{applicationLink}}" class="button-link" style="background-color: #007bff; color: #ffffff;">Voir ma candidature</a>
</p>
<p>Cordialement,</p>
<p>L'équipe Katapult</p>"#
                    .to_string(),
            },
        );

        catalog.insert(
            "application_status_submitted",
            EmailTemplate {
                subject: "Votre candidature {{applicationName}} a été soumise".to_string(),
                body: r#"<h1 style="font-size: 22px; color: #0d2d5e; margin-top: 0; margin-bottom: 20px;">Votre candidature a été soumise</h1>
<p>Bonjour {{firstName}} {{lastName}},</p>
<p>Votre candidature "<strong>{{applicationName}}</strong>" a bien été marquée comme soumise.</p>
<p>Nous allons l'examiner prochainement. Vous pouvez suivre son avancement via le lien ci-dessous :</p>
<p style="text-align: center; margin-bottom: 30px;">
  <a href="{{applicationLink}}" class="button-link" style="background-color: #007bff; color: #ffffff;">Suivre ma candidature</a>
</p>
<p>Cordialement,</p>
<p>L'équipe Katapult</p>"#
                    .to_string(),
            },
        );

        catalog.insert(
            "application_status_review",
            EmailTemplate {
                subject: "Votre candidature {{applicationName}} est en cours d'évaluation"
                    .to_string(),
                body: r#"<h1 style="font-size: 22px; color: #0d2d5e; margin-top: 0; margin-bottom: 20px;">Candidature en cours d'évaluation</h1>
<p>Bonjour {{firstName}} {{lastName}},</p>
<p>Bonne nouvelle ! Votre candidature "<strong>{{applicationName}}</strong>" est maintenant en cours d'évaluation par notre équipe.</p>
<p>Nous vous tiendrons informé de la suite donnée. Vous pouvez consulter votre candidature ici :</p>
<p style="text-align: center; margin-bottom: 30px;">
  <a href="{{applicationLink}}" class="button-link" style="background-color: #007bff; color: #ffffff;">Consulter ma candidature</a>
</p>
<p>Cordialement,</p>
<p>L'équipe Katapult</p>"#
                    .to_string(),
            },
        );

        catalog.insert(
            "application_status_accepted",
            EmailTemplate {
                subject: "Félicitations ! Votre candidature {{applicationName}} a été acceptée"
                    .to_string(),
                body: r#"<h1 style="font-size: 22px; color: #198754; margin-top: 0; margin-bottom: 20px;">Félicitations, candidature acceptée !</h1>
<p>Bonjour {{firstName}} {{lastName}},</p>
<p>Excellente nouvelle ! Nous avons le plaisir de vous informer que votre candidature "<strong>{{applicationName}}</strong>" a été acceptée.</p>
<p>Nous reviendrons vers vous très prochainement avec plus de détails sur les prochaines étapes.</p>
<p style="text-align: center; margin-bottom: 30px;">
  <a href="{{applicationLink}}" class="button-link" style="background-color: #198754; color: #ffffff;">Voir les détails</a>
</p>
<p>Cordialement,</p>
<p>L'équipe Katapult</p>"#
                    .to_string(),
            },
        );

        catalog.insert(
            "application_status_rejected",
            EmailTemplate {
                subject: "Concernant votre candidature {{applicationName}}".to_string(),
                body: r#"<h1 style="font-size: 22px; color: #dc3545; margin-top: 0; margin-bottom: 20px;">Suite à votre candidature</h1>
<p>Bonjour {{firstName}} {{lastName}},</p>
<p>Nous vous remercions de l'intérêt que vous portez à notre programme avec votre candidature "<strong>{{applicationName}}</strong>".</p>
<p>Après un examen attentif, nous sommes au regret de vous informer qu'elle n'a pas été retenue cette fois-ci.</p>
{{#if adminNotes}}
<div class="admin-notes-block">
  <p>{{adminNotes}}</p>
</div>
{{/if}}
<p>Nous vous encourageons à persévérer dans vos projets.</p>
<p>Cordialement,</p>
<p>L'équipe Katapult</p>"#
                    .to_string(),
            },
        );

        catalog.insert(
            "application_status_draft_return",
            EmailTemplate {
                subject: "Votre candidature {{applicationName}} a été remise en brouillon"
                    .to_string(),
                body: r#"<h1 style="font-size: 22px; color: #ffc107; margin-top: 0; margin-bottom: 20px;">Candidature remise en brouillon</h1>
<p>Bonjour {{firstName}} {{lastName}},</p>
<p>Votre candidature "<strong>{{applicationName}}</strong>" a été remise à l'état de brouillon.</p>
<p>Cela peut être dû à une demande de modifications ou d'informations complémentaires.</p>
{{#if adminNotes}}
<div class="admin-notes-block" style="border-left-color: #0dcaf0;">
   <p>{{adminNotes}}</p>
</div>
{{/if}}
<p>Veuillez la consulter et la soumettre à nouveau une fois complétée via le lien suivant :</p>
<p style="text-align: center; margin-bottom: 30px;">
  <a href="{{applicationLink}}" class="button-link" style="background-color: #ffc107; color: #000;">Modifier ma candidature</a>
</p>
<p>Cordialement,</p>
<p>L'équipe Katapult</p>"#
                    .to_string(),
            },
        );

        catalog
    }
}

fn substitute(template: &str, data: &TemplateData) -> String {
    let mut rendered = template.to_string();
    for (key, value) in data.pairs() {
        let needle = ["{{", key, "}}"].concat();
        if rendered.contains(&needle) {
            rendered = rendered.replace(&needle, value);
        }
    }
    rendered
}

/// Keeps or drops `{{#if key}}...{{/if}}` blocks. Unbalanced markers are
/// passed through untouched.
fn resolve_conditional(body: &str, key: &str, keep: bool) -> String {
    let open = ["{{#if ", key, "}}"].concat();
    let close = "{{/if}}";

    let mut result = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find(&open) {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + open.len()..];
        match after_open.find(close) {
            Some(end) => {
                if keep {
                    result.push_str(after_open[..end].trim_matches('\n'));
                }
                rest = &after_open[end + close.len()..];
            }
            None => {
                result.push_str(&rest[start..]);
                return result;
            }
        }
    }
    result.push_str(rest);
    result
}

fn wrap_in_layout(subject: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="fr">
<head>
  <meta charset="UTF-8">
  <title>{subject}</title>
</head>
<body style="font-family: Arial, 'Helvetica Neue', Helvetica, sans-serif; font-size: 16px; color: #333333; background-color: #f4f4f4; margin: 0; padding: 0;">
  <div class="email-container" style="width: 100%; padding: 20px 0;">
    <div class="email-content" style="width: 600px; max-width: 100%; margin: 0 auto; background-color: #ffffff; border-radius: 8px;">
      <div class="email-body" style="padding: 30px 40px; line-height: 1.6;">
{body}
      </div>
      <div class="email-footer" style="padding: 20px 40px; text-align: center; font-size: 12px; color: #777777;">
        Cet email a été envoyé automatiquement par la plateforme Katapult. Merci de ne pas y répondre.
      </div>
    </div>
  </div>
</body>
</html>"#
    )
}
