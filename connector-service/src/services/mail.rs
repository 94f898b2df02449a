//! Templated seller/operator emails, queued in `process_email` and delivered over SMTP

use async_trait::async_trait;
use handlebars::Handlebars;
use lazy_static::lazy_static;
use lettre::{
    message::{header, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::MailConfig;
use crate::models::adyen::ShareholderContact;
use crate::models::mirakl::Shop;
use crate::models::{NewEmail, ProcessEmail, EMAIL_FAILED, EMAIL_SENT};
use crate::repository::EmailRepository;

pub const BANK_ACCOUNT_VERIFICATION_TEMPLATE: &str = "bankAccountVerificationEmail";
pub const AWAITING_DATA_TEMPLATE: &str = "accountHolderAwaitingDataEmail";
pub const VALIDATION_TEMPLATE: &str = "accountHolderValidationEmail";
pub const PAYOUT_FAILED_TEMPLATE: &str = "accountHolderPayoutFailedEmail";
pub const TRANSFER_FUND_FAILED_TEMPLATE: &str = "transferFundFailedEmail";

pub const BANK_ACCOUNT_VERIFICATION_TITLE: &str = "email.bank.verification.title";
pub const AWAITING_DATA_TITLE: &str = "email.account.verification.awaiting.data.title";
pub const VALIDATION_TITLE: &str = "email.account.holder.validation.title";
pub const PAYOUT_FAILED_TITLE: &str = "email.account.holder.payout.failed.title";
pub const TRANSFER_FUND_FAILED_TITLE: &str = "email.transfer.fund.failed.title";

lazy_static! {
    static ref TITLES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert(BANK_ACCOUNT_VERIFICATION_TITLE, "Your bank account could not be verified");
        m.insert(AWAITING_DATA_TITLE, "Additional information is needed to verify your identity");
        m.insert(VALIDATION_TITLE, "Your payment account details need attention");
        m.insert(PAYOUT_FAILED_TITLE, "Your payout has failed");
        m.insert(TRANSFER_FUND_FAILED_TITLE, "A fund transfer has failed");
        m
    };
}

/// Message-key lookup; unknown keys are used verbatim
pub fn title(key: &str) -> &str {
    TITLES.get(key).copied().unwrap_or(key)
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Template error: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("Render error: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No recipient: {0}")]
    NoRecipient(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

pub struct MailTemplateService {
    engine: Handlebars<'static>,
    emails: Arc<dyn EmailRepository>,
    sender_name: String,
    operator_email: Option<String>,
}

impl MailTemplateService {
    pub fn new(
        emails: Arc<dyn EmailRepository>,
        sender_name: String,
        operator_email: Option<String>,
    ) -> Result<Self, MailError> {
        let mut engine = Handlebars::new();
        Self::register_templates(&mut engine)?;

        Ok(Self {
            engine,
            emails,
            sender_name,
            operator_email,
        })
    }

    fn register_templates(engine: &mut Handlebars) -> Result<(), MailError> {
        engine.register_template_string(
            BANK_ACCOUNT_VERIFICATION_TEMPLATE,
            include_str!("../../templates/email/bankAccountVerificationEmail.hbs"),
        )?;
        engine.register_template_string(
            AWAITING_DATA_TEMPLATE,
            include_str!("../../templates/email/accountHolderAwaitingDataEmail.hbs"),
        )?;
        engine.register_template_string(
            VALIDATION_TEMPLATE,
            include_str!("../../templates/email/accountHolderValidationEmail.hbs"),
        )?;
        engine.register_template_string(
            PAYOUT_FAILED_TEMPLATE,
            include_str!("../../templates/email/accountHolderPayoutFailedEmail.hbs"),
        )?;
        engine.register_template_string(
            TRANSFER_FUND_FAILED_TEMPLATE,
            include_str!("../../templates/email/transferFundFailedEmail.hbs"),
        )?;
        Ok(())
    }

    fn render(&self, template: &str, mut data: Map<String, Value>, context: Value) -> Result<String, MailError> {
        data.insert("sender".to_string(), json!(self.sender_name));
        if let Value::Object(extra) = context {
            data.extend(extra);
        }
        Ok(self.engine.render(template, &data)?)
    }

    async fn queue(&self, to_address: &str, title_key: &str, content: String) -> Result<ProcessEmail, MailError> {
        let email = self
            .emails
            .enqueue(NewEmail {
                to_address: to_address.to_string(),
                subject: title(title_key).to_string(),
                content,
                multipart: true,
                html: true,
            })
            .await?;

        info!(id = email.id, to = %email.to_address, subject = %email.subject, "Queued email");
        Ok(email)
    }

    pub async fn send_shop_email(
        &self,
        shop: &Shop,
        template: &str,
        title_key: &str,
        context: Value,
    ) -> Result<ProcessEmail, MailError> {
        let contact = &shop.contact_information;
        let to_address = contact
            .email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| MailError::NoRecipient(format!("shop {} has no email", shop.id)))?;

        let mut data = Map::new();
        data.insert(
            "shop".to_string(),
            json!({
                "id": shop.id,
                "name": shop.name,
                "firstname": contact.firstname,
                "lastname": contact.lastname,
                "email": to_address,
            }),
        );

        let content = self.render(template, data, context)?;
        self.queue(to_address, title_key, content).await
    }

    pub async fn send_shareholder_email(
        &self,
        shareholder: &ShareholderContact,
        shop_id: &str,
        template: &str,
        title_key: &str,
    ) -> Result<ProcessEmail, MailError> {
        if shareholder.email.trim().is_empty() {
            return Err(MailError::NoRecipient(format!(
                "shareholder {:?} has no email",
                shareholder.shareholder_code
            )));
        }

        let mut data = Map::new();
        data.insert("shareholder".to_string(), serde_json::to_value(&shareholder.name).unwrap_or_default());
        data.insert("shopId".to_string(), json!(shop_id));

        let content = self.render(template, data, Value::Null)?;
        self.queue(shareholder.email.trim(), title_key, content).await
    }

    pub async fn send_operator_email(
        &self,
        template: &str,
        title_key: &str,
        context: Value,
    ) -> Result<ProcessEmail, MailError> {
        let to_address = self
            .operator_email
            .clone()
            .ok_or_else(|| MailError::NoRecipient("no operator email configured".to_string()))?;

        let content = self.render(template, Map::new(), context)?;
        self.queue(&to_address, title_key, content).await
    }
}

/// Plain-text alternative of an html body
pub fn html_to_text(html: &str) -> String {
    html.replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n\n")
        .replace("</li>", "\n")
        .split('<')
        .enumerate()
        .filter_map(|(i, s)| {
            if i == 0 {
                Some(s.to_string())
            } else {
                s.split_once('>').map(|(_, text)| text.to_string())
            }
        })
        .collect::<Vec<String>>()
        .join("")
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &ProcessEmail) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    smtp_transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| MailError::Smtp(format!("Invalid SMTP host: {}", e)))?
            .port(config.smtp_port);
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("{}: {}", config.from_address, e)))?;

        Ok(Self {
            smtp_transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: &ProcessEmail) -> Result<Message, MailError> {
        let to: Mailbox = email
            .to_address
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("{}: {}", email.to_address, e)))?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone());

        let content_type = if email.html {
            header::ContentType::TEXT_HTML
        } else {
            header::ContentType::TEXT_PLAIN
        };

        let message = if email.multipart {
            builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(html_to_text(&email.content)),
                    )
                    .singlepart(SinglePart::builder().header(content_type).body(email.content.clone())),
            )
        } else {
            builder.header(content_type).body(email.content.clone())
        };

        message.map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: &ProcessEmail) -> Result<(), MailError> {
        let message = self.build_message(email)?;
        self.smtp_transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;
        Ok(())
    }
}

/// Drains the `TO_SEND` queue
pub struct EmailSender {
    transport: Arc<dyn MailTransport>,
    emails: Arc<dyn EmailRepository>,
    max_email_retries: i64,
}

impl EmailSender {
    pub fn new(transport: Arc<dyn MailTransport>, emails: Arc<dyn EmailRepository>, max_email_retries: i32) -> Self {
        Self {
            transport,
            emails,
            max_email_retries: i64::from(max_email_retries),
        }
    }

    /// Returns the number of emails delivered
    pub async fn send_pending(&self) -> Result<usize, sqlx::Error> {
        let pending = self.emails.find_to_send().await?;
        let mut sent = 0;

        for email in pending {
            match self.transport.send(&email).await {
                Ok(()) => {
                    self.emails.update_state(email.id, EMAIL_SENT).await?;
                    info!(id = email.id, to = %email.to_address, "Email sent");
                    sent += 1;
                }
                Err(e) => {
                    let failures = self.emails.add_error(email.id, &e.to_string()).await?;
                    if failures >= self.max_email_retries {
                        error!(id = email.id, to = %email.to_address, failures, error = %e, "Giving up on email");
                        self.emails.update_state(email.id, EMAIL_FAILED).await?;
                    } else {
                        warn!(id = email.id, to = %email.to_address, failures, error = %e, "Failed to send email");
                    }
                }
            }
        }

        Ok(sent)
    }
}
