use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Serialize, Serializer};
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

/// A prospective customer's chat identity and where they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lead {
    pub telegram_id: u64,
    #[serde(serialize_with = "serialize_username")]
    pub username: Option<String>,
    pub full_name: String,
    pub source: String,
}

impl Lead {
    pub fn new(
        telegram_id: u64,
        username: Option<String>,
        full_name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            telegram_id,
            username,
            full_name: full_name.into(),
            source: source.into(),
        }
    }

    pub fn from_user(user: &teloxide::types::User, source: impl Into<String>) -> Self {
        Self::new(user.id.0, user.username.clone(), user.full_name(), source)
    }
}

/// Usernames go out as `@name`, or `""` when the user has none.
fn serialize_username<S: Serializer>(
    username: &Option<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match username.as_deref() {
        Some(name) if !name.is_empty() => serializer.serialize_str(&format!("@{}", name)),
        _ => serializer.serialize_str(""),
    }
}

/// Posts leads to an external webhook (e.g. a Google Apps Script web app).
///
/// Delivery is best-effort: one attempt, bounded by the client timeout, and
/// every failure is swallowed. Without an endpoint the notifier does nothing.
#[derive(Debug, Clone)]
pub struct LeadNotifier {
    client: reqwest::Client,
    endpoint: Option<Url>,
}

impl LeadNotifier {
    pub fn new(endpoint: Option<Url>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build lead webhook HTTP client")?;
        Ok(Self { client, endpoint })
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Deliver `lead` on a detached task.
    ///
    /// Returns `None` without spawning anything when no endpoint is configured.
    /// The handle never needs to be awaited; it resolves once delivery finished
    /// or failed.
    pub fn dispatch(&self, lead: Lead) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            return None;
        }
        let notifier = self.clone();
        Some(tokio::spawn(async move { notifier.notify(&lead).await }))
    }

    /// Deliver `lead` and wait for the outcome, which is discarded.
    pub async fn notify(&self, lead: &Lead) {
        let Some(endpoint) = &self.endpoint else {
            return;
        };

        match self.post(endpoint, lead).await {
            Ok(()) => debug!(
                "Lead {} (source: {}) delivered",
                lead.telegram_id, lead.source
            ),
            Err(e) => debug!(
                "Lead {} (source: {}) not delivered: {:#}",
                lead.telegram_id, lead.source, e
            ),
        }
    }

    async fn post(&self, endpoint: &Url, lead: &Lead) -> Result<()> {
        let response = self
            .client
            .post(endpoint.clone())
            .json(lead)
            .send()
            .await
            .context("Failed to send lead to webhook")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Lead webhook returned {}", status);
        }

        Ok(())
    }
}
