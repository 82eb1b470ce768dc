//! Outbound account notification emails.
//!
//! Delivery is fire-and-forget: sends are spawned onto the runtime and the
//! triggering request never waits for or learns about the outcome. Failures
//! are logged at `warn`. Without an API key configured, sends are skipped
//! entirely, which also keeps local development and tests quiet.

use serde_json::json;

#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
}

impl Mailer {
    const SEND_URL: &'static str = "https://api.sendgrid.com/v3/mail/send";

    pub fn from_env() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: std::env::var("SENDGRID_API_KEY").ok(),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@taskbox.app".into()),
        }
    }

    pub fn send_welcome(&self, email: &str, name: &str) {
        self.deliver(
            email,
            "Thanks for joining in.",
            format!(
                "Welcome to the app, {}. Let me know how you get along with the app.",
                name
            ),
        );
    }

    pub fn send_cancellation(&self, email: &str, name: &str) {
        self.deliver(
            email,
            "Sorry to see you go.",
            format!(
                "Goodbye, {}. Was there something we could have done to keep you on board?",
                name
            ),
        );
    }

    fn deliver(&self, to: &str, subject: &str, text: String) {
        let api_key = match &self.api_key {
            Some(key) => key.clone(),
            None => {
                log::debug!("mailer not configured, skipping '{}' to {}", subject, to);
                return;
            }
        };

        let body = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": text }],
        });

        let client = self.client.clone();
        let to = to.to_string();
        let subject = subject.to_string();
        tokio::spawn(async move {
            let result = client
                .post(Self::SEND_URL)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(response) if !response.status().is_success() => {
                    log::warn!(
                        "email '{}' to {} rejected with status {}",
                        subject,
                        to,
                        response.status()
                    );
                }
                Err(err) => log::warn!("email '{}' to {} failed: {}", subject, to, err),
                Ok(_) => {}
            }
        });
    }
}
