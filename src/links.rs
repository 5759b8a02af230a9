use anyhow::{bail, Context, Result};
use url::Url;

/// Builds `https://<host>/<handle>` deep links that open a chat with the operator.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    base: Url,
}

impl LinkBuilder {
    pub fn new(host: &str, handle: &str) -> Result<Self> {
        if host.is_empty() {
            bail!("Link host is empty");
        }
        if handle.is_empty() || !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("Invalid operator handle: {:?}", handle);
        }

        let base = Url::parse(&format!("https://{}/{}", host, handle))
            .with_context(|| format!("Failed to build operator link for host {}", host))?;
        Ok(Self { base })
    }

    /// Link to the operator's chat with `text` prefilled in the input field.
    pub fn prefilled(&self, text: &str) -> Url {
        let mut url = self.base.clone();
        // Already percent-encoded, so `set_query` leaves it untouched.
        url.set_query(Some(&format!("text={}", urlencoding::encode(text))));
        url
    }

    /// Link to the operator's chat without any prefilled text.
    pub fn direct(&self) -> Url {
        self.base.clone()
    }

    /// Every prefilled link starts with this string.
    pub fn prefix(&self) -> String {
        format!("{}?text=", self.base)
    }
}
