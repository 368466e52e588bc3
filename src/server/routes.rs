//! The analyze route: quota, upload, encoding, inference, relay. Nothing is
//! retried; every outcome becomes exactly one response.

use super::protocol::read_image;
use super::{relay, ApiError, Gateway};
use crate::quota::Admission;
use crate::util::client_key;
use actix_multipart::Multipart;
use actix_web::{post, web, HttpRequest, HttpResponse};
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, ApiError>;

#[post("/api/analyze")]
pub async fn analyze(
    req: HttpRequest,
    payload: Multipart,
    state: web::Data<Gateway>,
) -> Result<HttpResponse> {
    let client = client_key(&req);

    // Counted before the upload is looked at
    match state.quota.admit(&client) {
        Admission::Denied { limit } => {
            warn!("client {client} reached the daily limit of {limit}");
            return Err(ApiError::QuotaExceeded(limit));
        }
        Admission::Admitted { count } => {
            debug!("client {client} admitted ({count}/{})", state.quota.daily_limit());
        }
    }

    let image = read_image(payload).await.map_err(|e| {
        warn!("rejected upload from {client}: {e}");
        ApiError::NoImage
    })?;
    debug!("client {client} uploaded {image:?}");

    let outcome = state.inference.invoke(image.to_data_url()).await?;

    info!(
        "finished analyze request from {client} with status {}",
        outcome.status
    );
    Ok(relay(outcome))
}

#[cfg(test)]
mod tests {
    use crate::config::Settings;
    use crate::server::protocol::test_support::{body, content_type, Part};
    use crate::server::{configure, Gateway, ANALYZE_FAILED};
    use actix_web::http::header::CONTENT_TYPE;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: Part<'static> = ("image", Some("scan.png"), Some("image/png"), b"png bytes");

    fn settings(endpoint: Option<String>, daily_limit: u32) -> Settings {
        Settings {
            endpoint_url: endpoint,
            token: Some("hf_test".into()),
            daily_limit,
            ..Settings::default()
        }
    }

    fn analyze_request(peer: &str, parts: &[Part]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/analyze")
            .peer_addr(peer.parse().unwrap())
            .insert_header((CONTENT_TYPE, content_type()))
            .set_payload(body(parts))
    }

    async fn mock_remote(status: u16, reply: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_json(reply))
            .mount(&server)
            .await;
        server
    }

    macro_rules! app {
        ($settings:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(Gateway::new($settings).unwrap()))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_success_is_relayed() {
        let reply = json!({
            "choices": [{ "message": { "content": "1) Modality and view: PA chest" } }]
        });
        let remote = mock_remote(200, reply.clone()).await;
        let app = app!(settings(Some(remote.uri()), 3));

        let res = test::call_service(
            &app,
            analyze_request("10.0.0.1:4000", &[PNG]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body, reply);
    }

    #[actix_web::test]
    async fn test_fourth_request_is_denied() {
        let remote = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(3)
            .mount(&remote)
            .await;
        let app = app!(settings(Some(remote.uri()), 3));

        for _ in 0..3 {
            let res = test::call_service(
                &app,
                analyze_request("10.0.0.2:4000", &[PNG]).to_request(),
            )
            .await;
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = test::call_service(
            &app,
            analyze_request("10.0.0.2:4001", &[PNG]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(
            body,
            json!({ "error": "Daily free limit reached (3 analyses/day)." })
        );

        let remote_calls = remote.received_requests().await.unwrap().len();
        assert_eq!(remote_calls, 3);
    }

    #[actix_web::test]
    async fn test_clients_have_separate_quotas() {
        let remote = mock_remote(200, json!({})).await;
        let app = app!(settings(Some(remote.uri()), 1));

        let res = test::call_service(
            &app,
            analyze_request("10.0.0.3:4000", &[PNG]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let res = test::call_service(
            &app,
            analyze_request("10.0.0.3:4000", &[PNG]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let res = test::call_service(
            &app,
            analyze_request("10.0.0.4:4000", &[PNG]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_missing_image() {
        let remote = mock_remote(200, json!({})).await;
        let app = app!(settings(Some(remote.uri()), 3));

        let res = test::call_service(
            &app,
            analyze_request("10.0.0.5:4000", &[("note", None, None, b"no file here")]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body, json!({ "error": "No image uploaded" }));
        assert!(remote.received_requests().await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_rejected_upload_still_counts() {
        let remote = mock_remote(200, json!({})).await;
        let app = app!(settings(Some(remote.uri()), 1));

        let res = test::call_service(
            &app,
            analyze_request("10.0.0.6:4000", &[]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let res = test::call_service(
            &app,
            analyze_request("10.0.0.6:4000", &[PNG]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn test_missing_endpoint() {
        let app = app!(settings(None, 3));

        let res = test::call_service(
            &app,
            analyze_request("10.0.0.7:4000", &[PNG]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("HF_ENDPOINT_URL"));
    }

    #[actix_web::test]
    async fn test_missing_token() {
        let remote = mock_remote(200, json!({})).await;
        let app = app!(Settings {
            token: None,
            ..settings(Some(remote.uri()), 3)
        });

        let res = test::call_service(
            &app,
            analyze_request("10.0.0.8:4000", &[PNG]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("HF_TOKEN"));
        assert!(remote.received_requests().await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_remote_503_is_relayed() {
        let reply = json!({ "error": "Service Unavailable", "estimated_time": 120.5 });
        let remote = mock_remote(503, reply.clone()).await;
        let app = app!(settings(Some(remote.uri()), 3));

        let res = test::call_service(
            &app,
            analyze_request("10.0.0.9:4000", &[PNG]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body, reply);
    }

    #[actix_web::test]
    async fn test_unreachable_remote() {
        // Nothing listens on the discard port
        let app = app!(settings(Some("http://127.0.0.1:9".into()), 3));

        let res = test::call_service(
            &app,
            analyze_request("10.0.0.10:4000", &[PNG]).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body, json!({ "error": ANALYZE_FAILED }));
    }

    #[actix_web::test]
    async fn test_image_is_sent_inline() {
        let remote = mock_remote(200, json!({})).await;
        let app = app!(settings(Some(remote.uri()), 3));

        test::call_service(
            &app,
            analyze_request("10.0.0.11:4000", &[PNG]).to_request(),
        )
        .await;

        let requests = remote.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            sent["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,cG5nIGJ5dGVz"
        );
    }
}
