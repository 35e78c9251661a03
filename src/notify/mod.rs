// src/notify/mod.rs
pub mod email;

use anyhow::Result;
use async_trait::async_trait;

use crate::sink::MatchRecord;

/// Alert body limit for the excerpt, in characters.
pub const ALERT_EXCERPT_CHARS: usize = 800;

/// Rendered alert: one subject, a plain-text body and an HTML alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl AlertMessage {
    /// `"<label> Alert: <company> (<ticker>) - <form>"`, with the CIK in place
    /// of the ticker when the record carries none.
    pub fn for_match(label: &str, rec: &MatchRecord) -> Self {
        let f = &rec.filing;
        let tag = rec.ticker.as_deref().unwrap_or(&f.entity_id);
        let subject = format!("{label} Alert: {} ({tag}) - {}", f.entity_name, f.filing_type);
        let company = match &rec.ticker {
            Some(t) => format!("{} ({t})", f.entity_name),
            None => f.entity_name.clone(),
        };

        let excerpt: String = rec.excerpt.chars().take(ALERT_EXCERPT_CHARS).collect();
        let page = rec
            .estimated_page
            .map(|p| p.to_string())
            .unwrap_or_else(|| "N/A".into());
        let triggers = join_or_dash(&rec.trigger_terms_found);
        let contexts = join_or_dash(&rec.context_terms_found);

        let text = format!(
            "{label} match detected\n\n\
             Company: {company}\nCIK: {}\nFiling type: {}\nFiling date: {}\nURL: {}\n\
             Estimated page: {page}\nTrigger terms: {triggers}\nContext terms: {contexts}\n\n\
             Excerpt:\n{excerpt}\n\nDetected at: {}\n",
            f.entity_id,
            f.filing_type,
            f.filing_date,
            f.document_url,
            rec.timestamp.to_rfc3339()
        );

        let esc = |s: &str| html_escape::encode_text(s).to_string();
        let url_attr = html_escape::encode_double_quoted_attribute(&f.document_url).to_string();
        let html = format!(
            "<html><body>\
             <h2>{} match detected</h2>\
             <table>\
             <tr><td><b>Company</b></td><td>{}</td></tr>\
             <tr><td><b>CIK</b></td><td>{}</td></tr>\
             <tr><td><b>Filing type</b></td><td>{}</td></tr>\
             <tr><td><b>Filing date</b></td><td>{}</td></tr>\
             <tr><td><b>Document</b></td><td><a href=\"{url_attr}\">{}</a></td></tr>\
             <tr><td><b>Estimated page</b></td><td>{page}</td></tr>\
             <tr><td><b>Trigger terms</b></td><td>{}</td></tr>\
             <tr><td><b>Context terms</b></td><td>{}</td></tr>\
             </table>\
             <h3>Excerpt</h3><blockquote>{}</blockquote>\
             </body></html>",
            esc(label),
            esc(&company),
            esc(&f.entity_id),
            esc(&f.filing_type),
            esc(&f.filing_date),
            esc(&f.document_url),
            esc(&triggers),
            esc(&contexts),
            esc(&excerpt),
        );

        Self {
            subject,
            text,
            html,
        }
    }
}

fn join_or_dash(terms: &[String]) -> String {
    if terms.is_empty() {
        "-".to_string()
    } else {
        terms.join(", ")
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, msg: &AlertMessage) -> Result<()>;
    fn name(&self) -> &'static str;
}
