use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub operator: OperatorConfig,
    #[serde(default)]
    pub leads: LeadsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperatorConfig {
    /// Operator's Telegram username, without the leading `@`
    pub username: String,
    #[serde(default = "default_link_host")]
    pub link_host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LeadsConfig {
    /// Lead forwarding is disabled when this is absent or empty
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_link_host() -> String {
    "t.me".to_string()
}

fn default_timeout_secs() -> u64 {
    8
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validated()
    }

    /// Load from `BOT_TOKEN`, `MANAGER_USERNAME`, `LEADS_WEBHOOK_URL` and
    /// `LEADS_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str, hint: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("{} is missing. {}", key, hint))
        };

        let bot_token = required("BOT_TOKEN", "Set it to the token issued by @BotFather.")?;
        let username = required(
            "MANAGER_USERNAME",
            "Set it to the operator's username (without @).",
        )?;

        let timeout_secs = match lookup("LEADS_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("LEADS_TIMEOUT_SECS is not a number: {:?}", value))?,
            None => default_timeout_secs(),
        };

        let config = Config {
            telegram: TelegramConfig { bot_token },
            operator: OperatorConfig {
                username,
                link_host: default_link_host(),
            },
            leads: LeadsConfig {
                webhook_url: lookup("LEADS_WEBHOOK_URL"),
                timeout_secs,
            },
        };
        config.validated()
    }

    /// Trim and normalize values, failing on anything the bot cannot start with.
    fn validated(mut self) -> Result<Self> {
        self.telegram.bot_token = self.telegram.bot_token.trim().to_string();
        if self.telegram.bot_token.is_empty() {
            bail!("telegram.bot_token is empty");
        }

        let username = self.operator.username.trim();
        self.operator.username = username.strip_prefix('@').unwrap_or(username).to_string();
        if self.operator.username.is_empty() {
            bail!("operator.username is empty");
        }
        if !self
            .operator
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            bail!(
                "operator.username may only contain letters, digits and underscores: {:?}",
                self.operator.username
            );
        }

        self.operator.link_host = self.operator.link_host.trim().to_string();
        if self.operator.link_host.is_empty() {
            bail!("operator.link_host is empty");
        }

        self.leads.webhook_url = self
            .leads
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);
        self.lead_webhook()?;

        if self.leads.timeout_secs == 0 {
            bail!("leads.timeout_secs must be greater than zero");
        }

        Ok(self)
    }

    /// Parsed lead webhook URL, `None` when lead forwarding is disabled.
    pub fn lead_webhook(&self) -> Result<Option<Url>> {
        self.leads
            .webhook_url
            .as_deref()
            .map(|raw| Url::parse(raw).context("LEADS_WEBHOOK_URL is not a valid URL"))
            .transpose()
    }

    pub fn lead_timeout(&self) -> Duration {
        Duration::from_secs(self.leads.timeout_secs)
    }
}
