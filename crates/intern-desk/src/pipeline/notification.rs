use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{ApplicantId, OutboundMessage, Post, PostId, RankedApplicant, SelectionPolicy};
use super::error::{InvalidInput, PipelineError};
use crate::remote::{NotificationQuery, PlacementGateway, TieBreakSendRequest};

/// How the service resolves the recipient set. The client never sends a recipient list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "value", rename_all = "snake_case")]
pub enum NotificationMethod {
    #[serde(rename = "positions")]
    ByPositions(u32),
    TopPercent(u8),
}

impl NotificationMethod {
    /// Mirrors the shortlist policy; by-positions takes its value from the post.
    pub fn for_policy(policy: SelectionPolicy, post: &Post) -> Self {
        match policy {
            SelectionPolicy::ByPositions => Self::ByPositions(post.declared_positions()),
            SelectionPolicy::TopPercent(percent) => Self::TopPercent(percent),
        }
    }

    pub fn query(self) -> NotificationQuery {
        match self {
            Self::ByPositions(value) => NotificationQuery {
                method: "positions",
                value,
            },
            Self::TopPercent(value) => NotificationQuery {
                method: "top_percent",
                value: u32::from(value),
            },
        }
    }
}

/// Subject and body with `{name}`, `{email}`, `{score}` and `{post_title}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub subject: String,
    pub body: String,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            subject: "Shortlisted for {post_title}".to_string(),
            body: "Dear {name},\n\nYou have been shortlisted for {post_title}. \
                   We will contact you at {email} with next steps.\n\nRegards,\nHR"
                .to_string(),
        }
    }
}

impl MessageTemplate {
    fn validate(&self) -> Result<(), InvalidInput> {
        if self.subject.trim().is_empty() {
            return Err(InvalidInput::TemplateEmpty { field: "subject" });
        }
        if self.body.trim().is_empty() {
            return Err(InvalidInput::TemplateEmpty { field: "body" });
        }
        Ok(())
    }

    fn fill(template: &str, recipient: &RankedApplicant, post: &Post) -> String {
        let score = recipient
            .score
            .map(|score| format!("{score:.1}"))
            .unwrap_or_else(|| "n/a".to_string());
        template
            .replace("{name}", &recipient.name)
            .replace("{email}", &recipient.email)
            .replace("{score}", &score)
            .replace("{post_title}", &post.title)
    }
}

/// Locally rendered messages for operator review. Building one never sends anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewBundle {
    pub post_id: PostId,
    pub method: NotificationMethod,
    pub messages: Vec<OutboundMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    Shortlist,
    TieBreak,
}

/// What was actually sent, per recipient, as reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub kind: DeliveryKind,
    pub delivered: usize,
    pub deliveries: Vec<OutboundMessage>,
}

/// Composes previews locally and hands delivery to the placement service.
pub struct NotificationDispatcher<G: ?Sized> {
    gateway: Arc<G>,
    post_id: PostId,
}

impl<G> NotificationDispatcher<G>
where
    G: PlacementGateway + ?Sized,
{
    pub fn new(gateway: Arc<G>, post_id: PostId) -> Self {
        Self { gateway, post_id }
    }

    pub fn preview(
        &self,
        post: &Post,
        method: NotificationMethod,
        recipients: &[RankedApplicant],
        template: &MessageTemplate,
    ) -> Result<PreviewBundle, InvalidInput> {
        template.validate()?;

        let messages = recipients
            .iter()
            .map(|recipient| OutboundMessage {
                to: recipient.email.clone(),
                subject: MessageTemplate::fill(&template.subject, recipient, post),
                body: MessageTemplate::fill(&template.body, recipient, post),
                applicant_id: Some(recipient.id.clone()),
            })
            .collect::<Vec<_>>();

        debug!(post_id = %self.post_id, recipients = messages.len(), "notification preview rendered");
        Ok(PreviewBundle {
            post_id: self.post_id.clone(),
            method,
            messages,
        })
    }

    /// Sends to whatever recipient set the service resolves for `bundle.method`.
    ///
    /// Not idempotent: calling twice with the same bundle sends twice.
    pub async fn dispatch(&self, bundle: &PreviewBundle) -> Result<DeliveryReport, PipelineError> {
        let response = self
            .gateway
            .send_top_emails(&bundle.post_id, bundle.method.query())
            .await
            .inspect_err(|err| {
                warn!(post_id = %bundle.post_id, error = %err, "notification dispatch failed")
            })?;

        let delivered = response.sent_count.unwrap_or(response.emails.len());
        info!(post_id = %bundle.post_id, delivered, "notifications dispatched");
        Ok(DeliveryReport {
            kind: DeliveryKind::Shortlist,
            delivered,
            deliveries: response.emails,
        })
    }

    pub(crate) async fn dispatch_tie_break(
        &self,
        links: &BTreeMap<ApplicantId, String>,
    ) -> Result<DeliveryReport, PipelineError> {
        let response = self
            .gateway
            .send_tie_break(
                &self.post_id,
                TieBreakSendRequest {
                    links: links.clone(),
                },
            )
            .await
            .inspect_err(|err| {
                warn!(post_id = %self.post_id, error = %err, "tie-break dispatch failed")
            })?;

        info!(post_id = %self.post_id, delivered = response.sent_count, "tie-break emails sent");
        Ok(DeliveryReport {
            kind: DeliveryKind::TieBreak,
            delivered: response.sent_count,
            deliveries: response.emails,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Html,
}

impl DocumentFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            DocumentFormat::PlainText => "text/plain; charset=utf-8",
            DocumentFormat::Html => "text/html; charset=utf-8",
        }
    }
}

/// Displayable form of a message. Presentation is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
    pub format: DocumentFormat,
    pub title: String,
    pub content: String,
}

pub fn render(message: &OutboundMessage, format: DocumentFormat) -> RenderedDocument {
    let content = match format {
        DocumentFormat::PlainText => format!(
            "To: {}\nSubject: {}\n\n{}\n",
            message.to,
            message.subject,
            message.body.trim_end()
        ),
        DocumentFormat::Html => render_html(message),
    };

    RenderedDocument {
        format,
        title: message.subject.clone(),
        content,
    }
}

fn render_html(message: &OutboundMessage) -> String {
    let mut html = String::from("<article>");
    html.push_str(&format!(
        "<header><h1>{}</h1><p>To: {}</p></header>",
        escape_html(&message.subject),
        escape_html(&message.to)
    ));

    for paragraph in message
        .body
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
    {
        let lines = paragraph
            .lines()
            .map(|line| escape_html(line.trim()))
            .collect::<Vec<_>>()
            .join("<br>");
        html.push_str(&format!("<p>{lines}</p>"));
    }

    html.push_str("</article>");
    html
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
