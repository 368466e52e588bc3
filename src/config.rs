//! Scanrelay configuration. Defaults live here as constants; `Settings::load`
//! layers an optional TOML file and the environment on top of them.

use anyhow::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::env;

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,actix_web=info,actix_server=info";

/// Config file read from the working directory unless `SCANRELAY_CONFIG` is set
pub const CONFIG_FILE: &str = "scanrelay.toml";

/// Prefix of the environment variables that override config file values
pub const ENV_PREFIX: &str = "SCANRELAY";

pub const DEFAULT_PORT: u16 = 3000;

/// Analyses allowed per client per calendar day
pub const DEFAULT_DAILY_LIMIT: u32 = 20;

pub const DEFAULT_MODEL: &str = "google/medgemma-27b-it";

pub const DEFAULT_TEMPERATURE: f64 = 0.2;

pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// How often stale quota records are pruned
pub const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 60 * 60;

pub const DEFAULT_STATIC_DIR: &str = "public";

/// Instruction text sent ahead of every image
pub const DEFAULT_PROMPT: &str = "You are an assistant for medical imaging (X-ray, CT, MRI, ultrasound, echocardiogram). First, decide whether the image appears to be a medical imaging study. If it is clearly NOT a medical imaging study (e.g., a normal photo of objects/people), respond exactly with: \"This is not a radiology image.\" and stop. If it appears to be medical imaging OR you are not fully sure, DO NOT reject it. Instead continue with the report format below. If image quality is too low or the image is heavily edited/screenshot/compressed and you cannot interpret safely, write: \"Image quality insufficient for reliable interpretation.\" then stop.\n\nIf you continue, respond in this exact structure:\n1) Modality and view.\n2) Key findings as bullet points.\n3) Most likely impression.\n4) Top two differential diagnoses.\n5) Urgent red flags to rule out.\n6) Clear disclaimer: not a medical diagnosis; clinician/radiologist review required.";

/// Runtime settings of the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Port the HTTP server listens on
    pub port: u16,

    pub daily_limit: u32,

    /// Base URL of the inference endpoint. Checked per request, not at startup
    pub endpoint_url: Option<String>,

    /// Bearer credential for the inference endpoint. Checked per request
    pub token: Option<String>,

    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,

    /// Upper bound on a single inference call. No timeout when unset
    pub request_timeout_secs: Option<u64>,

    pub prune_interval_secs: u64,

    /// Directory of the web frontend, served at `/` when present
    pub static_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            port: DEFAULT_PORT,
            daily_limit: DEFAULT_DAILY_LIMIT,
            endpoint_url: None,
            token: None,
            model: DEFAULT_MODEL.into(),
            prompt: DEFAULT_PROMPT.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: None,
            prune_interval_secs: DEFAULT_PRUNE_INTERVAL_SECS,
            static_dir: Some(DEFAULT_STATIC_DIR.into()),
        }
    }
}

impl Settings {
    /// Load settings from defaults, the config file, `SCANRELAY_*` variables
    /// and finally `HF_ENDPOINT_URL`, `HF_TOKEN` and `PORT`
    pub fn load() -> Result<Self> {
        let file = env::var("SCANRELAY_CONFIG").unwrap_or_else(|_| CONFIG_FILE.into());

        let settings = Self::defaults()?
            .add_source(File::with_name(&file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("endpoint_url", env::var("HF_ENDPOINT_URL").ok())?
            .set_override_option("token", env::var("HF_TOKEN").ok())?
            .set_override_option("port", env::var("PORT").ok())?
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("daily_limit", i64::from(DEFAULT_DAILY_LIMIT))?
            .set_default("model", DEFAULT_MODEL)?
            .set_default("prompt", DEFAULT_PROMPT)?
            .set_default("temperature", DEFAULT_TEMPERATURE)?
            .set_default("max_tokens", i64::from(DEFAULT_MAX_TOKENS))?
            .set_default("prune_interval_secs", DEFAULT_PRUNE_INTERVAL_SECS as i64)?
            .set_default("static_dir", DEFAULT_STATIC_DIR)?)
    }

    /// The endpoint URL, treating an empty value as absent
    pub fn endpoint_url(&self) -> Option<&str> {
        self.endpoint_url.as_deref().filter(|url| !url.is_empty())
    }

    /// The bearer token, treating an empty value as absent
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }
}
