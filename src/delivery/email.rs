//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use super::Delivery;
use crate::error::{ConfigError, DeliveryError};
use crate::report::DailyReport;

/// Port that selects implicit TLS; anything else uses STARTTLS.
pub const IMPLICIT_TLS_PORT: u16 = 465;

// ── Configuration ───────────────────────────────────────────────────

/// SMTP delivery configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub to_address: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` unless both `EMAIL_TO` and `SMTP_HOST` are set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let (Some(to_address), Some(smtp_host)) = (var("EMAIL_TO"), var("SMTP_HOST")) else {
            return Ok(None);
        };

        let smtp_port = match var("SMTP_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "SMTP_PORT".into(),
                message: e.to_string(),
            })?,
            None => IMPLICIT_TLS_PORT,
        };

        let username = var("SMTP_USER").unwrap_or_default();
        let password = SecretString::from(var("SMTP_PASSWORD").unwrap_or_default());
        let from_address = var("EMAIL_FROM").unwrap_or_else(|| {
            if username.contains('@') {
                username.clone()
            } else {
                to_address.clone()
            }
        });

        Ok(Some(Self {
            to_address,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        }))
    }
}

// ── Message rendering ───────────────────────────────────────────────

/// Subject line carrying the report date.
pub fn subject_for(report: &DailyReport) -> String {
    format!("Daily Health Plan \u{2014} {}", report.date)
}

/// Plain-text body: the advice followed by a context footer.
pub fn render_body(report: &DailyReport) -> String {
    let ctx = &report.context_summary;
    let mut body = String::with_capacity(report.advice.len() + 256);
    body.push_str(&report.advice);
    body.push_str("\n\n----\n");
    body.push_str(&format!(
        "Wearable data: {}\n",
        if ctx.biometrics_available { "yes" } else { "no" }
    ));
    if ctx.document_kinds.is_empty() {
        body.push_str("Reports used: none\n");
    } else {
        let kinds: Vec<&str> = ctx.document_kinds.iter().map(|k| k.as_str()).collect();
        body.push_str(&format!("Reports used: {}\n", kinds.join(", ")));
    }
    if ctx.image_analyses_count > 0 {
        body.push_str(&format!("Image analyses: {}\n", ctx.image_analyses_count));
        for severity in &ctx.image_severities {
            body.push_str(&format!("  {severity}\n"));
        }
    }
    body.push_str(&format!(
        "Model: {}\nGenerated: {}\n",
        report.model,
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    body
}

// ── Transport ───────────────────────────────────────────────────────

pub struct SmtpDelivery {
    config: EmailConfig,
}

impl SmtpDelivery {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, report: &DailyReport) -> Result<Message, DeliveryError> {
        let from = self
            .config
            .from_address
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress {
                address: self.config.from_address.clone(),
                reason: format!("{e}"),
            })?;
        let to = self
            .config
            .to_address
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress {
                address: self.config.to_address.clone(),
                reason: format!("{e}"),
            })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject_for(report))
            .header(ContentType::TEXT_PLAIN)
            .body(render_body(report))
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }

    fn transport(&self) -> Result<SmtpTransport, DeliveryError> {
        let builder = if self.config.smtp_port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&self.config.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
        }
        .map_err(|e| DeliveryError::SendFailed(format!("SMTP relay error: {e}")))?
        .port(self.config.smtp_port);

        let builder = if self.config.username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.expose_secret().to_string(),
            ))
        };
        Ok(builder.build())
    }
}

#[async_trait]
impl Delivery for SmtpDelivery {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, report: &DailyReport) -> Result<(), DeliveryError> {
        let message = self.build_message(report)?;
        let transport = self.transport()?;
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| DeliveryError::SendFailed(format!("SMTP task failed: {e}")))?
            .map_err(|e| DeliveryError::SendFailed(format!("SMTP send failed: {e}")))?;

        tracing::info!(to = %self.config.to_address, date = %report.date, "Report emailed");
        Ok(())
    }
}
