#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use students_disciplines::db::users::{PgUserRepository, UserRepository};
use students_disciplines::error::RepoError;
use students_disciplines::lifecycle::{Lifecycle, Readiness, ShutdownTimings};
use students_disciplines::models::{NewUser, User};
use students_disciplines::state::{AppState, SharedState};

/// A freshly created database with migrations applied.
pub struct TestDb {
    pub pool: PgPool,
    pub db_name: String,
    admin_url: String,
}

/// Create a unique test database from `DATABASE_URL`.
pub async fn test_db() -> TestDb {
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let db_name = format!("disciplines_test_{}", Uuid::now_v7().simple());

    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    students_disciplines::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations on test database");

    TestDb {
        pool,
        db_name,
        admin_url,
    }
}

/// Drop the test database.
pub async fn drop_db(db: TestDb) {
    db.pool.close().await;

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&db.admin_url)
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!(
        "DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)",
        db.db_name
    ))
    .execute(&admin_pool)
    .await;

    admin_pool.close().await;
}

/// A running server backed by a dedicated test database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub readiness: Readiness,
    pub db: TestDb,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Create a user, return the assigned id.
    pub async fn create_user(&self, username: &str) -> u64 {
        let (body, status) = self.post("/user/", &user_json(username)).await;
        assert_eq!(status, StatusCode::OK, "create user failed: {body}");
        body["data"]["id"].as_u64().expect("id in create response")
    }
}

/// Spawn the full app on a random port against a fresh database.
pub async fn spawn_app() -> TestApp {
    let db = test_db().await;

    let lifecycle = Lifecycle::new(ShutdownTimings::default());
    let readiness = lifecycle.readiness();

    let state: SharedState = Arc::new(AppState {
        users: Arc::new(PgUserRepository::new(db.pool.clone())),
        readiness: readiness.clone(),
    });
    let app = students_disciplines::build_app(state, Duration::from_secs(5));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        lifecycle
            .run(listener, app, std::future::pending::<()>())
            .await
            .expect("Server failed");
    });

    TestApp {
        addr,
        client: Client::new(),
        readiness,
        db,
    }
}

pub async fn cleanup(app: TestApp) {
    drop_db(app.db).await;
}

pub fn new_user(username: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        password_hash: format!("$argon2id$v=19$hash-of-{username}"),
        email: format!("{username}@university.test"),
        phone_number: "+1-555-0100".to_string(),
        role: "student".to_string(),
    }
}

pub fn user_json(username: &str) -> Value {
    serde_json::to_value(new_user(username)).unwrap()
}

/// In-memory [`UserRepository`] with the same observable semantics as the
/// Postgres one. `fail_with` forces every call to return the given error.
#[derive(Default)]
pub struct MemoryUsers {
    inner: Mutex<MemoryInner>,
    pub fail_with: Option<RepoError>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    rows: HashMap<i64, User>,
}

impl MemoryUsers {
    pub fn failing(err: RepoError) -> Self {
        MemoryUsers {
            fail_with: Some(err),
            ..Default::default()
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    fn check(&self) -> Result<(), RepoError> {
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn create(&self, user: &NewUser) -> Result<i64, RepoError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        if inner.rows.values().any(|u| u.username == user.username) {
            return Err(RepoError::Conflict);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.insert(
            id,
            User {
                id,
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
                email: user.email.clone(),
                phone_number: user.phone_number.clone(),
                role: user.role.clone(),
                created_at: Utc::now(),
                last_login: None,
            },
        );
        Ok(id)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, RepoError> {
        self.check()?;
        self.inner
            .lock()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn update_by_id(&self, id: i64, user: &NewUser) -> Result<(), RepoError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        if inner
            .rows
            .values()
            .any(|u| u.id != id && u.username == user.username)
        {
            return Err(RepoError::Conflict);
        }
        let row = inner.rows.get_mut(&id).ok_or(RepoError::NotFound)?;
        row.username = user.username.clone();
        row.password_hash = user.password_hash.clone();
        row.email = user.email.clone();
        row.phone_number = user.phone_number.clone();
        row.role = user.role.clone();
        Ok(())
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), RepoError> {
        self.check()?;
        self.inner
            .lock()
            .await
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}
