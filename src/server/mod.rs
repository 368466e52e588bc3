//! The user-facing HTTP front end. Every failure in the analyze pipeline ends
//! up as an `ApiError`, which renders as `{ "error": "<message>" }`.

use crate::config::Settings;
use crate::inference::{InferenceClient, InferenceError, InferenceOutcome};
use crate::quota::{self, QuotaTracker};
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

pub mod protocol;
pub mod routes;

/// Body of a 500 that has no more specific explanation
pub const ANALYZE_FAILED: &str = "Failed to analyze image";

/// Shared state of the HTTP workers
#[derive(Debug)]
pub struct Gateway {
    pub quota: QuotaTracker,
    pub inference: InferenceClient,
}

impl Gateway {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        Ok(Gateway {
            quota: QuotaTracker::new(settings.daily_limit),
            inference: InferenceClient::new(settings)?,
        })
    }
}

/// Periodically drop quota records from days before today
pub async fn prune_quota(gateway: web::Data<Gateway>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let evicted = gateway.quota.evict_before(quota::today());
        if evicted > 0 {
            info!("pruned {evicted} stale quota records");
        }
    }
}

/// Mount the gateway's API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(routes::analyze);
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Daily free limit reached ({0} analyses/day).")]
    QuotaExceeded(u32),

    #[error("No image uploaded")]
    NoImage,

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ApiError {
    /// The message sent to the client. Transport and decode failures are
    /// collapsed so no remote detail leaks
    fn public_message(&self) -> String {
        match self {
            ApiError::Inference(InferenceError::Transport(_))
            | ApiError::Inference(InferenceError::Decode(_)) => ANALYZE_FAILED.into(),
            other => other.to_string(),
        }
    }
}

impl actix_web::error::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("analyze error: {self:?}");
        }

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(json!({ "error": self.public_message() }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NoImage => StatusCode::BAD_REQUEST,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Answer with the inference service's own status and body
pub fn relay(outcome: InferenceOutcome) -> HttpResponse {
    // Status codes outside 100..=999 can't be represented by actix
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::BAD_GATEWAY);

    HttpResponse::build(status)
        .insert_header(ContentType::json())
        .json(outcome.body)
}
