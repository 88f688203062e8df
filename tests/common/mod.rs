#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use leadflow::auth::password;
use leadflow::clock::{Clock, ManualClock, SystemClock};
use leadflow::config::{Config, MailConfig};
use leadflow::db;
use leadflow::db::leads::NewLead;
use leadflow::mail::transport::{
    Delivery, DeliveryTransport, OutgoingEmail, TransportError, TransportErrorKind,
};
use leadflow::models::{Lead, LeadSnapshot};
use leadflow::state::SharedState;

pub const ADMIN_EMAIL: &str = "admin@test.com";
pub const ADMIN_PASSWORD: &str = "password123";

/// Transport that records every attempt and fails for chosen recipients.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
    attempts: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    flaky: Mutex<HashMap<String, u32>>,
    verify_error: Mutex<Option<TransportError>>,
    delay: Duration,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send takes `delay` before it resolves.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail_for(&self, recipient: &str) {
        self.failing.lock().unwrap().insert(recipient.to_string());
    }

    /// Fail the next `times` sends to `recipient`, then accept.
    pub fn fail_times(&self, recipient: &str, times: u32) {
        self.flaky.lock().unwrap().insert(recipient.to_string(), times);
    }

    pub fn fail_verify(&self, err: TransportError) {
        *self.verify_error.lock().unwrap() = Some(err);
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent().into_iter().map(|e| e.to).collect()
    }

    /// Recipients of every attempt, failed ones included, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<Delivery, TransportError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.attempts.lock().unwrap().push(email.to.clone());

        let flaky = match self.flaky.lock().unwrap().get_mut(&email.to) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        };

        if flaky || self.failing.lock().unwrap().contains(&email.to) {
            return Err(TransportError::new(
                TransportErrorKind::Rejected,
                format!("mailbox unavailable: {}", email.to),
            )
            .with_code("550"));
        }

        self.sent.lock().unwrap().push(email.clone());
        Ok(Delivery {
            message_id: Some(format!("<{}@test>", Uuid::now_v7())),
            accepted: vec![email.to.clone()],
            rejected: Vec::new(),
        })
    }

    async fn verify(&self) -> Result<(), TransportError> {
        match self.verify_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
    ))
}

/// Mail settings with no pacing delays.
pub fn test_mail_config() -> MailConfig {
    MailConfig {
        from: "studio@test.com".to_string(),
        admin_recipient: "owner@test.com".to_string(),
        send_delay: Duration::ZERO,
        batch_delay: Duration::ZERO,
        transport_timeout: Duration::from_secs(2),
        ..MailConfig::default()
    }
}

pub fn test_config(database_url: &str) -> Config {
    Config {
        database_url: database_url.to_string(),
        jwt_secret: "test-jwt-secret-that-is-long-enough".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        base_url: "http://localhost:0".to_string(),
        trusted_proxies: vec![],
        cors_origin: None,
        intake_per_minute: 100,
        admin: None,
        log_level: "warn".to_string(),
        mail: test_mail_config(),
        smtp: None,
        sendgrid: None,
    }
}

pub fn snapshot(name: &str, email: &str) -> LeadSnapshot {
    LeadSnapshot {
        id: Uuid::now_v7(),
        name: name.to_string(),
        email: email.to_string(),
        whatsapp_country_code: "+49".to_string(),
        whatsapp_number: "15112345678".to_string(),
        description: "Fineline rose on the forearm".to_string(),
        reference_images: vec![],
        discount_percentage: 30,
        utm_source: None,
        utm_medium: None,
        utm_campaign: None,
        created_at: Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
    }
}

fn database_url() -> String {
    let _ = dotenvy::dotenv();
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests")
}

fn with_db_name(base_url: &str, db_name: &str) -> String {
    base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.to_string())
}

/// A fresh migrated database. Returns the pool, its URL and its name.
pub async fn create_test_db() -> (PgPool, String, String) {
    let base_url = database_url();
    let db_name = format!("leadflow_test_{}", Uuid::now_v7().simple());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&with_db_name(&base_url, "postgres"))
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = with_db_name(&base_url, &db_name);
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    (pool, test_url, db_name)
}

/// Drop a database created by `create_test_db`.
pub async fn drop_test_db(pool: PgPool, db_name: &str) {
    pool.close().await;

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&with_db_name(&database_url(), "postgres"))
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}

pub async fn insert_lead(pool: &PgPool, name: &str, email: &str) -> Lead {
    let images = json!([]);
    db::leads::create(
        pool,
        &NewLead {
            name,
            email,
            whatsapp_country_code: "+49",
            whatsapp_number: "15112345678",
            tattoo_description: "Small dragon on the shoulder",
            reference_images: &images,
            discount_percentage: 30,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            ip_address: None,
            user_agent: None,
        },
    )
    .await
    .expect("insert lead")
}

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
    pub state: SharedState,
    pub transport: Arc<RecordingTransport>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn create_admin(&self) {
        let hash = password::hash(ADMIN_PASSWORD).unwrap();
        db::admin_users::create(&self.pool, ADMIN_EMAIL, &hash)
            .await
            .expect("create admin");
    }

    pub async fn login(&self, email: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Create the admin account and return an access token.
    pub async fn bootstrap(&self) -> String {
        self.create_admin().await;
        let (body, status) = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "bootstrap login failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn submit_lead(&self, form: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/leads"))
            .json(form)
            .send()
            .await
            .expect("submit lead failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn patch_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("patch request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn delete_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("delete request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Poll until the transport has delivered `count` messages or two seconds pass.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<OutgoingEmail> {
        for _ in 0..40 {
            let sent = self.transport.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.transport.sent()
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Spawn a test app with a fresh temporary database and a recording transport.
pub async fn spawn_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let (pool, test_url, db_name) = create_test_db().await;

    let mut config = test_config(&test_url);
    configure(&mut config);

    let transport = Arc::new(RecordingTransport::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = leadflow::build_state(pool.clone(), config, clock, transport.clone());
    let app = leadflow::router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        pool,
        client,
        db_name,
        state,
        transport,
    }
}

/// Drop the test database after tests complete.
pub async fn cleanup(app: TestApp) {
    let TestApp { pool, db_name, .. } = app;
    drop_test_db(pool, &db_name).await;
}
