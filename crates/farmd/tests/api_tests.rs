//! HTTP API tests driven in-process through the router.
//!
//! The language model is a scripted fake; no network access.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use farm_common::{
    Advisor, Dataset, FakeLlmClient, LlmClient, LlmError, ModelConfig, UsagePredictor,
    FALLBACK_RESPONSE,
};
use farmd::{router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const USAGE_CSV: &str = "\
Area,Year,Value
X,2000,10
X,2001,12
Y,2000,5
Y,2001,7
";

fn app_with(client: impl LlmClient + 'static) -> Router {
    let dataset = Dataset::from_reader(USAGE_CSV.as_bytes()).unwrap();
    let predictor = UsagePredictor::train(&dataset, &ModelConfig::default()).unwrap();
    let client: Box<dyn LlmClient> = Box::new(client);
    router(AppState::new(dataset, predictor, Arc::new(Advisor::new(client))))
}

fn app() -> Router {
    app_with(FakeLlmClient::always_reply("- Spray less this season"))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
    (status, value)
}

async fn new_session(app: &Router) -> String {
    let (status, body) = send(app, "POST", "/v1/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

// ============================================================================
// Health and data
// ============================================================================

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["records"], 4);
    assert_eq!(body["regions"], 2);
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn test_regions_sorted_with_codes() {
    let app = app();
    let (status, body) = send(&app, "GET", "/v1/regions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["regions"],
        json!([{"code": 0, "name": "X"}, {"code": 1, "name": "Y"}])
    );
}

#[tokio::test]
async fn test_trend_yearly_means() {
    let app = app();
    let (status, body) = send(&app, "GET", "/v1/trend?start=2000&end=2001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["points"],
        json!([{"year": 2000, "average": 7.5}, {"year": 2001, "average": 9.5}])
    );

    let (_, defaulted) = send(&app, "GET", "/v1/trend", None).await;
    assert_eq!(defaulted["start"], 2000);
    assert_eq!(defaulted["end"], 2001);
    assert_eq!(defaulted["points"], body["points"]);

    let (_, empty) = send(&app, "GET", "/v1/trend?start=2010&end=2016", None).await;
    assert_eq!(empty["points"], json!([]));
}

// ============================================================================
// Prediction and advice
// ============================================================================

#[tokio::test]
async fn test_predict_by_name_and_code_agree() {
    let app = app();
    let (status, by_name) = send(
        &app,
        "POST",
        "/v1/predict",
        Some(json!({"region": "X", "year": 2002})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_name["region_code"], 0);
    assert_eq!(by_name["region"], "X");
    assert!((by_name["predicted"].as_f64().unwrap() - 14.0).abs() < 1e-9);
    assert_eq!(by_name["predicted_rounded"].as_f64(), Some(14.0));

    let (_, by_code) = send(
        &app,
        "POST",
        "/v1/predict",
        Some(json!({"region": 0, "year": 2002})),
    )
    .await;
    assert_eq!(by_code["predicted"], by_name["predicted"]);
}

#[tokio::test]
async fn test_predict_extrapolates_unknown_code() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/predict",
        Some(json!({"region": 40, "year": 2030})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["region"].is_null());
    assert!(body["predicted"].as_f64().unwrap().is_finite());
}

#[tokio::test]
async fn test_predict_unknown_region_name() {
    let app = app();
    let (status, _) = send(
        &app,
        "POST",
        "/v1/predict",
        Some(json!({"region": "Atlantis", "year": 2002})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analyze_predicts_then_explains() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/analyze",
        Some(json!({"region": "Y", "year": 2002})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"]["region_code"], 1);
    assert!((body["prediction"]["predicted"].as_f64().unwrap() - 9.0).abs() < 1e-9);
    assert_eq!(body["advice"], "- Spray less this season");
}

#[tokio::test]
async fn test_explain() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/explain",
        Some(json!({"value": 14.0, "region": "0", "year": 2002})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["advice"], "- Spray less this season");
}

#[tokio::test]
async fn test_explain_accepts_numeric_region_code() {
    let fake = Arc::new(FakeLlmClient::always_reply("- Rotate crops"));
    let app = app_with(Arc::clone(&fake));
    let (status, body) = send(
        &app,
        "POST",
        "/v1/explain",
        Some(json!({"value": 14.0, "region": 7, "year": 2002})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["advice"], "- Rotate crops");

    let prompts = fake.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Area code: 7"));
    assert!(prompts[0].contains("Year: 2002"));
}

#[tokio::test]
async fn test_ask_rejects_blank_question() {
    let app = app();
    let (status, _) = send(&app, "POST", "/v1/ask", Some(json!({"question": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ask_returns_fallback_when_llm_fails() {
    let app = app_with(FakeLlmClient::always_error(LlmError::Auth(401)));
    let (status, body) = send(
        &app,
        "POST",
        "/v1/ask",
        Some(json!({"question": "Aphids on my cotton?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], FALLBACK_RESPONSE);
}

// ============================================================================
// Sessions and reviews
// ============================================================================

#[tokio::test]
async fn test_reviews_newest_first() {
    let app = app();
    let id = new_session(&app).await;
    let uri = format!("/v1/sessions/{id}/reviews");

    for (name, rating) in [("A", 5), ("B", 4), ("C", 2)] {
        let (status, body) = send(
            &app,
            "POST",
            &uri,
            Some(json!({
                "pesticide": name,
                "crop": "Wheat",
                "rating": rating,
                "comment": "tested on my field",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["pesticide"], name);
    }

    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["reviews"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["pesticide"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["C", "B", "A"]);
    assert_eq!(body["reviews"][0]["stars"], "★★☆☆☆");
}

#[tokio::test]
async fn test_invalid_review_leaves_board_unchanged() {
    let app = app();
    let id = new_session(&app).await;
    let uri = format!("/v1/sessions/{id}/reviews");

    let (status, message) = send(
        &app,
        "POST",
        &uri,
        Some(json!({"pesticide": "Neem", "crop": "Rice", "comment": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(message.as_str().unwrap().contains("Please fill all required fields"));

    let (_, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(body["reviews"], json!([]));
}

#[tokio::test]
async fn test_review_missing_pesticide_rejected() {
    let app = app();
    let id = new_session(&app).await;
    let uri = format!("/v1/sessions/{id}/reviews");

    let (status, message) = send(
        &app,
        "POST",
        &uri,
        Some(json!({"crop": "Rice", "rating": 3, "comment": "ok"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(message.as_str().unwrap().contains("Please fill all required fields"));

    let (_, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(body["reviews"], json!([]));
}

#[tokio::test]
async fn test_sessions_isolated_and_navigable() {
    let app = app();
    let a = new_session(&app).await;
    let b = new_session(&app).await;

    send(
        &app,
        "POST",
        &format!("/v1/sessions/{a}/reviews"),
        Some(json!({"pesticide": "Neem", "crop": "Maize", "rating": 4, "comment": "good"})),
    )
    .await;

    let (status, info) = send(
        &app,
        "POST",
        &format!("/v1/sessions/{a}/page"),
        Some(json!({"page": "feedback"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["page"], "feedback");
    assert_eq!(info["review_count"], 1);

    let (_, other) = send(&app, "GET", &format!("/v1/sessions/{b}"), None).await;
    assert_eq!(other["page"], "main");
    assert_eq!(other["review_count"], 0);

    let (_, health) = send(&app, "GET", "/v1/health", None).await;
    assert_eq!(health["sessions"], 2);
}

#[tokio::test]
async fn test_unknown_session() {
    let app = app();
    let (status, _) = send(
        &app,
        "GET",
        "/v1/sessions/00000000-0000-0000-0000-000000000000/reviews",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleted_session_is_gone() {
    let app = app();
    let a = new_session(&app).await;
    let b = new_session(&app).await;

    let (status, _) = send(&app, "DELETE", &format!("/v1/sessions/{a}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &format!("/v1/sessions/{a}/reviews"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", &format!("/v1/sessions/{a}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", &format!("/v1/sessions/{b}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, health) = send(&app, "GET", "/v1/health", None).await;
    assert_eq!(health["sessions"], 1);
}
