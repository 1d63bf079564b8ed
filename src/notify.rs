use anyhow::{Context, Result, bail};
use serde_json::json;

use crate::config::Config;

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Email channel backed by the SendGrid v3 API.
pub struct EmailSender {
    client: reqwest::Client,
    api_key: String,
    from: String,
    to: Vec<String>,
}

impl EmailSender {
    /// Capability check over the configuration. Missing credentials mean the
    /// channel is disabled, which is a normal state, not an error.
    pub fn from_config(config: &Config) -> Option<Self> {
        let Some(api_key) = config.sendgrid_api_key.clone() else {
            tracing::info!("SENDGRID_API_KEY not set; email notifications disabled");
            return None;
        };
        let Some(from) = config.email_from.clone() else {
            tracing::info!("EMAIL_FROM not set; email notifications disabled");
            return None;
        };
        let to = config.email_recipients();
        if to.is_empty() {
            tracing::info!("EMAIL_TO not set; email notifications disabled");
            return None;
        }

        Some(Self {
            client: reqwest::Client::new(),
            api_key,
            from,
            to,
        })
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let recipients: Vec<_> = self.to.iter().map(|addr| json!({ "email": addr })).collect();
        let payload = json!({
            "personalizations": [{ "to": recipients }],
            "from": { "email": &self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
        });

        let response = self
            .client
            .post(SENDGRID_SEND_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("email request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("email provider returned {status}");
        }

        tracing::info!(%status, "email notification sent");
        Ok(())
    }
}

/// SMS channel backed by the Twilio messages API.
pub struct SmsSender {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from: String,
    to: String,
}

impl SmsSender {
    pub fn from_config(config: &Config) -> Option<Self> {
        match (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_from,
            &config.sms_to,
        ) {
            (Some(account_sid), Some(auth_token), Some(from), Some(to)) => Some(Self {
                client: reqwest::Client::new(),
                account_sid: account_sid.clone(),
                auth_token: auth_token.clone(),
                from: from.clone(),
                to: to.clone(),
            }),
            _ => {
                tracing::info!("Twilio credentials not fully configured; SMS notifications disabled");
                None
            }
        }
    }

    async fn send(&self, body: &str) -> Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let params = [
            ("From", self.from.as_str()),
            ("To", self.to.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .context("sms request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("sms provider returned {status}");
        }

        tracing::info!(%status, "sms notification sent");
        Ok(())
    }
}

/// Fans a notification out to every configured channel. Delivery failures are
/// logged and discarded at this boundary so the calling endpoint always
/// succeeds once it has a message to send.
pub struct Notifier {
    email: Option<EmailSender>,
    sms: Option<SmsSender>,
}

impl Notifier {
    pub fn from_config(config: &Config) -> Self {
        Self {
            email: EmailSender::from_config(config),
            sms: SmsSender::from_config(config),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            email: None,
            sms: None,
        }
    }

    #[tracing::instrument(skip(self, subject, message))]
    pub async fn notify(&self, subject: &str, message: &str) {
        let email = async {
            if let Some(sender) = &self.email {
                if let Err(err) = sender.send(subject, message).await {
                    tracing::error!(error = ?err, "failed to send email notification");
                }
            }
        };
        let sms = async {
            if let Some(sender) = &self.sms {
                if let Err(err) = sender.send(message).await {
                    tracing::error!(error = ?err, "failed to send sms notification");
                }
            }
        };

        futures::future::join(email, sms).await;
    }
}
