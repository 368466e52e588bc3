//! Client for the remote multimodal inference service. A request carries the
//! configured instruction text and one inline image; the service's status
//! and JSON body come back untouched.

use crate::config::Settings;
use anyhow::Result;
use protocol::{ChatRequest, ContentPart, ImageUrl, Message};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

pub mod protocol;

/// Path appended to the configured endpoint base URL
pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Failures that happen on this side of the inference service
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("HF_ENDPOINT_URL missing: the inference endpoint URL is not configured")]
    MissingEndpoint,

    #[error("HF_TOKEN missing: the inference endpoint token is not configured")]
    MissingToken,

    #[error("request to the inference service failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("inference service returned an unreadable body: {0}")]
    Decode(#[source] reqwest::Error),
}

/// A request for one image interpretation
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub model: String,
    pub instruction_text: String,
    pub image_data_url: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl InferenceRequest {
    pub fn new(settings: &Settings, image_data_url: String) -> Self {
        InferenceRequest {
            model: settings.model.clone(),
            instruction_text: settings.prompt.clone(),
            image_data_url,
            temperature: settings.temperature,
            max_output_tokens: settings.max_tokens,
        }
    }
}

impl From<InferenceRequest> for ChatRequest {
    /// A single user turn: the instruction text, then the image
    fn from(req: InferenceRequest) -> ChatRequest {
        ChatRequest {
            model: req.model,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: req.instruction_text,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: req.image_data_url,
                        },
                    },
                ],
            }],
            temperature: req.temperature,
            max_tokens: req.max_output_tokens,
        }
    }
}

/// Whatever the inference service answered with
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub status: u16,
    pub body: Value,
}

/// Sends interpretation requests to the configured endpoint
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    settings: Settings,
}

impl InferenceClient {
    pub fn new(settings: Settings) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(InferenceClient {
            http: builder.build()?,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Send one image to the inference service and wait for the full reply.
    /// A missing endpoint or token fails before anything is sent
    pub async fn invoke(&self, image_data_url: String) -> Result<InferenceOutcome, InferenceError> {
        let endpoint = self
            .settings
            .endpoint_url()
            .ok_or(InferenceError::MissingEndpoint)?;
        let token = self.settings.token().ok_or(InferenceError::MissingToken)?;

        let url = completions_url(endpoint);
        let request: ChatRequest = InferenceRequest::new(&self.settings, image_data_url).into();

        debug!("sending inference request to {url}");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(InferenceError::Transport)?;

        let status = response.status().as_u16();
        let body = response
            .json::<Value>()
            .await
            .map_err(InferenceError::Decode)?;

        info!("inference service responded with status {status}");
        Ok(InferenceOutcome { status, body })
    }
}

fn completions_url(endpoint: &str) -> String {
    format!("{}{COMPLETIONS_PATH}", endpoint.trim_end_matches('/'))
}
