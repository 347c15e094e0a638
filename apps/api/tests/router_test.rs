use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

use scheduling_api::router::create_router;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

#[tokio::test]
async fn test_root_is_public() {
    let app = create_router(TestConfig::default().to_arc());

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_every_mounted_cell_requires_a_token() {
    let uris = [
        "/availability?doctorId=0f8b2a4e-57c1-4f3e-9d7a-6c1f2b3a4d5e",
        "/doctors/referral-search?q=smith",
        "/reservations/statistics",
        "/appointments/0f8b2a4e-57c1-4f3e-9d7a-6c1f2b3a4d5e",
        "/reports/0f8b2a4e-57c1-4f3e-9d7a-6c1f2b3a4d5e",
    ];

    for uri in uris {
        let app = create_router(TestConfig::default().to_arc());
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} should require a token", uri);
    }
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let config = TestConfig::default();
    let patient = TestUser::patient("patient@example.com");
    let app = create_router(config.to_arc());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reservations")
                .header(
                    "Authorization",
                    format!("Bearer {}", JwtTestUtils::create_expired_token(&patient, &config.jwt_secret)),
                )
                .header("Content-Type", "application/json")
                .body(Body::from(json!({}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
