// src/notify/email.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{AlertMessage, Notifier};
use crate::config::AlertConfig;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailSender {
    /// SMTP host and credentials from `SMTP_HOST` / `SMTP_USER` / `SMTP_PASS`;
    /// sender and recipients from the alert config.
    pub fn from_env(cfg: &AlertConfig) -> Result<Self> {
        let host = std::env::var("SMTP_HOST").context("SMTP_HOST missing")?;
        let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
        let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;
        let from_addr = cfg.from.clone().unwrap_or_else(|| user.clone());

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .with_context(|| format!("invalid SMTP_HOST `{host}`"))?
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let from: Mailbox = from_addr
            .parse()
            .with_context(|| format!("invalid sender address `{from_addr}`"))?;
        let to = parse_recipients(&cfg.recipients)?;

        Ok(Self { mailer, from, to })
    }

    pub fn recipients(&self) -> &[Mailbox] {
        &self.to
    }

    fn build(&self, msg: &AlertMessage) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(msg.subject.clone());
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .multipart(MultiPart::alternative_plain_html(
                msg.text.clone(),
                msg.html.clone(),
            ))
            .context("build email")
    }
}

fn parse_recipients(list: &[String]) -> Result<Vec<Mailbox>> {
    let to = list
        .iter()
        .map(|r| {
            r.parse::<Mailbox>()
                .with_context(|| format!("invalid recipient `{r}`"))
        })
        .collect::<Result<Vec<_>>>()?;
    if to.is_empty() {
        return Err(anyhow!("no alert recipients configured"));
    }
    Ok(to)
}

#[async_trait]
impl Notifier for EmailSender {
    async fn send(&self, msg: &AlertMessage) -> Result<()> {
        let email = self.build(msg)?;
        self.mailer.send(email).await.context("send email")?;
        tracing::info!(target: "notify", subject = %msg.subject, recipients = self.to.len(), "alert email sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
