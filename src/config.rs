use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment overrides look like `SPEECH_DUPLEX__SPEECH__KEY`
pub const ENV_PREFIX: &str = "SPEECH_DUPLEX";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct SpeechConfig {
    pub region: String,
    /// Service key; keep it out of the file and set it through the environment
    pub key: Option<String>,
    /// Where clients fetch `{token, region}`
    pub token_endpoint: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "speech-duplex")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 3000)?
            .set_default(
                "speech.token_endpoint",
                "http://127.0.0.1:3000/api/speech-token",
            )?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid speech-duplex configuration")
    }

    /// Service key and region, if the issuer can run
    pub fn issuer_credentials(&self) -> Option<(&str, &str)> {
        let key = self.speech.key.as_deref().filter(|k| !k.trim().is_empty())?;
        let region = self.speech.region.trim();
        if region.is_empty() {
            return None;
        }
        Some((key, region))
    }
}
