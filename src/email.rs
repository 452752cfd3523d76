//! ETA change notification emails

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::{
    config::SmtpConfig,
    errors::{EtaTrackerError, Result},
    timestamps::format_berlin,
};

const DELAY_COLOR: &str = "#d32f2f";
const ON_TIME_COLOR: &str = "#2e7d32";
const TEST_SUBJECT: &str = "ETA Watchlist Test Email";

/// Content of one ETA change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtaChangeEmail {
    pub vessel_name: String,
    pub shipment_reference: Option<String>,
    /// ISO 8601
    pub old_eta: Option<String>,
    /// ISO 8601
    pub new_eta: Option<String>,
    pub delay_days: i64,
}

impl EtaChangeEmail {
    pub fn subject(&self) -> String {
        match &self.shipment_reference {
            Some(reference) => format!("ETA-Aenderung: {} ({})", self.vessel_name, reference),
            None => format!("ETA-Aenderung: {}", self.vessel_name),
        }
    }

    pub fn delay_text(&self) -> String {
        if self.delay_days > 0 {
            format!("+{} Tage", self.delay_days)
        } else {
            format!("{} Tage", self.delay_days)
        }
    }

    fn delay_color(&self) -> &'static str {
        if self.delay_days > 0 {
            DELAY_COLOR
        } else {
            ON_TIME_COLOR
        }
    }

    pub fn text_body(&self) -> String {
        format!(
            "ETA-Aenderung erkannt\n\n\
             Vessel: {}\n\
             Sendung: {}\n\
             Alte ETA: {}\n\
             Neue ETA: {}\n\
             Verzoegerung: {}\n",
            self.vessel_name,
            self.shipment_reference.as_deref().unwrap_or("-"),
            format_berlin(self.old_eta.as_deref()),
            format_berlin(self.new_eta.as_deref()),
            self.delay_text(),
        )
    }

    pub fn html_body(&self) -> String {
        let row = |label: &str, value: &str, style: &str| {
            format!(
                "    <tr>\n      <td style=\"padding: 10px 14px; background: #f5f7fa; font-weight: 600;\">{}</td>\n      <td style=\"padding: 10px 14px;{}\">{}</td>\n    </tr>\n",
                label,
                style,
                escape_html(value)
            )
        };
        let highlight = |color: &str| format!(" color: {}; font-weight: 600;", color);

        let mut rows = String::new();
        rows.push_str(&row("Vessel", &self.vessel_name, ""));
        rows.push_str(&row(
            "Sendung",
            self.shipment_reference.as_deref().unwrap_or("-"),
            "",
        ));
        rows.push_str(&row("Alte ETA", &format_berlin(self.old_eta.as_deref()), ""));
        rows.push_str(&row(
            "Neue ETA",
            &format_berlin(self.new_eta.as_deref()),
            &highlight(DELAY_COLOR),
        ));
        rows.push_str(&row(
            "Verzoegerung",
            &self.delay_text(),
            &highlight(self.delay_color()),
        ));

        format!(
            "<html>\n<body style=\"font-family: Arial, sans-serif; color: #333;\">\n  \
             <h2 style=\"color: #1a1a2e;\">ETA-Aenderung erkannt</h2>\n  \
             <table style=\"border-collapse: collapse; width: 100%; max-width: 560px;\">\n{}  </table>\n  \
             <p style=\"margin-top: 24px; font-size: 13px; color: #888;\">\n    \
             Diese Benachrichtigung wurde gesendet, weil Sie dieses Vessel auf Ihrer Watchlist haben.<br>\n    \
             Verwalten Sie Ihre Watchlist unter: /watchlist\n  </p>\n</body>\n</html>\n",
            rows
        )
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Email delivery collaborator of the change detector
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `email` to `to`; an error means it was not delivered.
    async fn send_eta_change(&self, to: &str, email: &EtaChangeEmail) -> Result<()>;
}

/// SMTP delivery with STARTTLS and login credentials
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Fails with [`EtaTrackerError::MissingConfiguration`] when credentials
    /// are not configured.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        if config.address.trim().is_empty() {
            return Err(EtaTrackerError::MissingConfiguration("smtp.address".to_string()));
        }
        if config.password.is_empty() {
            return Err(EtaTrackerError::MissingConfiguration("smtp.password".to_string()));
        }

        let from: Mailbox = config.address.trim().parse()?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
            .port(config.port)
            .credentials(Credentials::new(
                config.address.trim().to_string(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }

    /// Construct from an optional config section
    pub fn from_config(config: Option<&SmtpConfig>) -> Result<Self> {
        match config {
            Some(config) => Self::new(config),
            None => Err(EtaTrackerError::MissingConfiguration("smtp".to_string())),
        }
    }

    /// Plain-text message to check delivery end to end
    pub async fn send_test(&self, to: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(TEST_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(String::from(
                "Dies ist eine Test-E-Mail aus ETA Tracker.\n\n\
                 Wenn du diese Nachricht siehst, funktioniert der E-Mail-Versand.",
            ))?;
        self.transport.send(message).await?;
        info!("[email] Test notification sent to {}", to);
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_eta_change(&self, to: &str, email: &EtaChangeEmail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(email.subject())
            .multipart(MultiPart::alternative_plain_html(
                email.text_body(),
                email.html_body(),
            ))?;
        self.transport.send(message).await?;
        info!(
            "[email] ETA notification sent to {} for {}",
            to, email.vessel_name
        );
        Ok(())
    }
}
