mod common;

use actix_web::http::StatusCode;
use actix_web::{dev::Payload, test, web, FromRequest};
use serde_json::json;

use blog_platform::auth::{hash_password, verify_password, Auth, JwtKeys};
use blog_platform::error::ApiError;
use blog_platform::repo::UserRepo;
use common::{keys, send, Harness};

#[actix_web::test]
async fn jwt_roundtrip_through_extractor() {
    let h = Harness::new();
    let (user, token) = h.user("tester").await;
    let req = test::TestRequest::default()
        .app_data(web::Data::new(keys()))
        .insert_header(("Authorization", token))
        .to_http_request();
    let mut pl = Payload::None;
    let auth = Auth::from_request(&req, &mut pl).await.expect("extract");
    assert_eq!(auth.user_id(), user.id);
    assert_eq!(auth.0.username, "tester");
}

#[actix_web::test]
async fn extractor_rejects_bad_or_foreign_tokens() {
    let h = Harness::new();
    let (user, _) = h.user("tester").await;

    let req = test::TestRequest::default()
        .app_data(web::Data::new(keys()))
        .insert_header(("Authorization", "Bearer notatoken"))
        .to_http_request();
    let err = Auth::from_request(&req, &mut Payload::None).await.err().unwrap();
    assert!(matches!(err, ApiError::Unauthorized));

    // signed with another secret
    let other = JwtKeys::new(b"another-secret-that-is-32-bytes-long");
    let req = test::TestRequest::default()
        .app_data(web::Data::new(keys()))
        .insert_header(("Authorization", format!("Bearer {}", other.issue(&user).unwrap())))
        .to_http_request();
    assert!(Auth::from_request(&req, &mut Payload::None).await.is_err());

    let req = test::TestRequest::default().app_data(web::Data::new(keys())).to_http_request();
    assert!(Auth::from_request(&req, &mut Payload::None).await.is_err());
}

#[::core::prelude::v1::test]
fn ensure_self_only_accepts_the_caller() {
    let keys = keys();
    let claims = keys
        .verify(
            &keys
                .issue(&blog_platform::models::User {
                    id: 7,
                    username: "seven".into(),
                    email: "seven@example.com".into(),
                    password_hash: String::new(),
                    first_name: String::new(),
                    last_name: String::new(),
                    bio: String::new(),
                    website: String::new(),
                    avatar: String::new(),
                    is_active: true,
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                })
                .unwrap(),
        )
        .unwrap();
    let auth = Auth(claims);
    assert_eq!(auth.ensure_self(None).unwrap(), 7);
    assert_eq!(auth.ensure_self(Some(7)).unwrap(), 7);
    assert!(matches!(auth.ensure_self(Some(8)), Err(ApiError::Forbidden)));
}

#[::core::prelude::v1::test]
fn password_hashes_verify() {
    let hash = hash_password("correct horse").unwrap();
    assert_ne!(hash, "correct horse");
    assert!(verify_password(&hash, "correct horse"));
    assert!(!verify_password(&hash, "battery staple"));
    assert!(!verify_password("not-a-phc-string", "correct horse"));
}

#[actix_web::test]
async fn register_then_login() {
    let h = Harness::new();
    let app = test::init_service(h.app()).await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(json!({"email": "Alice@Example.com", "password": "hunter2hunter2"}))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "registered successfully");
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

    // the issued token works straight away
    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", body["token"].as_str().unwrap())))
        .to_request();
    let (status, me) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "alice@example.com");

    // username or email both log in
    for login in ["alice", "alice@example.com"] {
        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(json!({"username": login, "password": "hunter2hunter2"}))
            .to_request();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK, "{login}");
        assert_eq!(body["user"]["name"], "alice");
    }
    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(json!({"email": "alice@example.com", "password": "hunter2hunter2"}))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(json!({"username": "alice", "password": "wrong-password"}))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(json!({"username": "nobody", "password": "hunter2hunter2"}))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn registration_validation_and_conflicts() {
    let h = Harness::new();
    let app = test::init_service(h.app()).await;
    let register = |body: serde_json::Value| test::TestRequest::post().uri("/register").set_json(body).to_request();

    let (status, _) = send(&app, register(json!({"email": "a@example.com", "password": "short"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, register(json!({"email": "not-an-email", "password": "longenough"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, register(json!({"password": "longenough"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, first) = send(&app, register(json!({"email": "sam@one.org", "password": "longenough"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["user"]["username"], "sam");

    // same local part on another domain gets a numbered username
    let (status, second) = send(&app, register(json!({"email": "sam@two.org", "password": "longenough"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["user"]["username"], "sam1");

    let (status, _) = send(&app, register(json!({"email": "SAM@one.org", "password": "longenough"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) =
        send(&app, register(json!({"email": "x@three.org", "password": "longenough", "username": "sam"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // malformed JSON still answers with the JSON error shape
    let req = test::TestRequest::post()
        .uri("/register")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid json"));

    let stored = h.repo.find_user_by_login("sam").await.unwrap();
    assert!(stored.password_hash.starts_with("$argon2"));
}

#[actix_web::test]
async fn usernames_cannot_shadow_an_email_login() {
    let h = Harness::new();
    let app = test::init_service(h.app()).await;
    let register = |body: serde_json::Value| test::TestRequest::post().uri("/register").set_json(body).to_request();

    let (status, _) =
        send(&app, register(json!({"email": "victim@example.com", "password": "victimpass"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(
        &app,
        register(json!({"email": "squat@example.com", "password": "squatpass", "username": "victim@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("username must be"));

    // the email owner still gets in by email
    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(json!({"email": "victim@example.com", "password": "victimpass"}))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "victim");
}
