use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use super::cache::CredentialSource;
use super::{Credential, IssuedToken};

/// Fetches credentials from the application's issuing route
///
/// Client side of the issuance boundary: a plain `GET` returning
/// `{"token": ..., "region": ...}`. The service key never leaves the server.
pub struct HttpCredentialSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCredentialSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fetch(&self) -> Result<Credential> {
        debug!("Requesting speech token from {}", self.endpoint);

        let resp = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .context("Failed to reach credential endpoint")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Failed to fetch speech token (HTTP {})", status);
        }

        let issued: IssuedToken = resp
            .json()
            .await
            .context("Credential endpoint returned an invalid body")?;

        Ok(issued.into())
    }
}

/// Exchanges the service key for a short-lived token (server side)
///
/// Calls the provider's token service for the configured region. The
/// response body is the raw token.
pub struct StsIssuer {
    client: reqwest::Client,
    key: String,
    region: String,
    endpoint: String,
}

impl StsIssuer {
    pub fn new(key: impl Into<String>, region: impl Into<String>) -> Self {
        let region = region.into();
        let endpoint = format!(
            "https://{}.api.cognitive.microsoft.com/sts/v1.0/issueToken",
            region
        );
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            region,
            endpoint,
        }
    }

    /// Point the issuer at a different token service (e.g. a local stand-in)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub async fn issue(&self) -> Result<IssuedToken> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await
            .context("Token service unreachable")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Token service rejected the speech key (HTTP {})", status);
        }

        let token = resp.text().await.context("Failed to read token")?;
        info!("Successfully obtained token for region {}", self.region);

        Ok(IssuedToken {
            token,
            region: self.region.clone(),
        })
    }
}

#[async_trait::async_trait]
impl CredentialSource for StsIssuer {
    async fn fetch(&self) -> Result<Credential> {
        Ok(self.issue().await?.into())
    }
}
