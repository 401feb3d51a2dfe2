#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{test, web, App, Error};
use serde_json::Value;

use blog_platform::auth::JwtKeys;
use blog_platform::error::json_error_handler;
use blog_platform::models::{NewPost, NewUser, User};
use blog_platform::rate_limit::RateLimiterFacade;
use blog_platform::repo::inmem::InMemRepo;
use blog_platform::repo::{PostRepo, UserRepo};
use blog_platform::storage::{sniff_mime, MediaStore, MediaStoreError};
use blog_platform::{config, AppState};

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

// ---------------- In-memory Mock MediaStore (tests only) ----------------
#[derive(Default)]
pub struct MockMediaStore {
    pub inner: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait::async_trait]
impl MediaStore for MockMediaStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        self.inner.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let map = self.inner.lock().unwrap();
        let bytes = map.get(key).cloned().ok_or(MediaStoreError::NotFound)?;
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }
    async fn delete(&self, key: &str) -> Result<(), MediaStoreError> {
        self.inner.lock().unwrap().remove(key);
        Ok(())
    }
}

pub struct Harness {
    pub repo: InMemRepo,
    pub media: Arc<MockMediaStore>,
    pub state: web::Data<AppState>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_limiter(None)
    }

    pub fn with_limiter(rate_limiter: Option<RateLimiterFacade>) -> Self {
        let repo = InMemRepo::new();
        let media = Arc::new(MockMediaStore::default());
        let state = web::Data::new(AppState {
            repo: Arc::new(repo.clone()),
            media: media.clone(),
            rate_limiter,
            max_upload_bytes: 1024 * 1024,
        });
        Self { repo, media, state }
    }

    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody>,
            Error = Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(self.state.clone())
            .app_data(web::Data::new(keys()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .configure(config)
    }

    /// Inserts a user straight into the store and returns it with a bearer token.
    pub async fn user(&self, name: &str) -> (User, String) {
        let user = self
            .repo
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                password_hash: String::new(),
            })
            .await
            .unwrap();
        let token = bearer(&user);
        (user, token)
    }

    pub async fn post(&self, author: &User, title: &str) -> i64 {
        self.repo
            .create_post(NewPost { title: title.into(), author_id: author.id, ..NewPost::default() })
            .await
            .unwrap()
            .post
            .id
    }
}

pub fn keys() -> JwtKeys {
    JwtKeys::new(SECRET.as_bytes())
}

pub fn bearer(user: &User) -> String {
    format!("Bearer {}", keys().issue(user).unwrap())
}

/// Calls the service and decodes the JSON body (`Null` when empty or not JSON).
pub async fn send<S, R, B>(app: &S, req: R) -> (StatusCode, Value)
where
    S: Service<R, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

// Helper to build a multipart body; returns (content-type, body)
pub fn multipart(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let boundary = "XBOUNDARYX";
    let mut body: Vec<u8> = Vec::new();
    for part in parts {
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

// Minimal 1x1 PNG (transparent)
pub fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}
