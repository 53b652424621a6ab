// backend/tests/helpers.rs
#![cfg(feature = "db-sqlite")]
#![allow(dead_code)]

use backend::{
    config::{AppConfig, AuthConfig, DatabaseConfig, WebConfig},
    web_server::AppState,
};
use common::{LoginResponse, RegisterPayload};
use reqwest::StatusCode;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use tokio::net::TcpListener;

pub const TEST_PASSWORD: &str = "password123";

/// Ids of the fixture rows inserted by [`seed_catalog`].
pub struct Catalog {
    pub achebe: i64,
    pub orwell: i64,
    pub things_fall_apart: i64,
    pub nineteen_eighty_four: i64,
}

pub fn test_config(port: u16) -> AppConfig {
    AppConfig {
        web: WebConfig {
            addr: "127.0.0.1".to_string(),
            port,
            cors_origin: "http://localhost:5173".to_string(),
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        auth: AuthConfig {
            // Cheapest cost bcrypt allows; keeps the suite fast.
            bcrypt_cost: 4,
            token_bytes: 20,
        },
    }
}

/// A fresh in-memory database with the schema applied.
pub async fn test_pool() -> SqlitePool {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true); // ON DELETE CASCADE depends on this

    // Every connection would get its own in-memory database, so keep exactly one.
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .expect("Failed to create in-memory database pool.");

    backend::db::MIGRATOR
        .run(&db_pool)
        .await
        .expect("Failed to run migrations on test database.");

    db_pool
}

pub async fn test_state() -> AppState {
    AppState {
        db_pool: test_pool().await,
        app_config: test_config(0),
    }
}

/// Spawn a test server and return the address, a reqwest client and the pool behind it.
pub async fn spawn_app() -> (SocketAddr, reqwest::Client, SqlitePool) {
    spawn_app_with(|_| {}).await
}

/// Like [`spawn_app`], with a hook to adjust the config first.
pub async fn spawn_app_with(
    configure: impl FnOnce(&mut AppConfig),
) -> (SocketAddr, reqwest::Client, SqlitePool) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut app_config = test_config(addr.port());
    configure(&mut app_config);

    let db_pool = test_pool().await;
    let app_state = AppState {
        db_pool: db_pool.clone(),
        app_config,
    };

    let app = backend::web_server::create_router(app_state);

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    (addr, client, db_pool)
}

pub async fn insert_author(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO authors (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("Failed to insert author")
}

pub async fn insert_book(pool: &SqlitePool, title: &str, year: i32, author_id: i64) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO books (title, publication_year, author_id) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(title)
    .bind(year)
    .bind(author_id)
    .fetch_one(pool)
    .await
    .expect("Failed to insert book")
}

pub async fn book_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM books")
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Two authors, one book each.
pub async fn seed_catalog(pool: &SqlitePool) -> Catalog {
    let achebe = insert_author(pool, "Chinua Achebe").await;
    let orwell = insert_author(pool, "George Orwell").await;
    let things_fall_apart = insert_book(pool, "Things Fall Apart", 1958, achebe).await;
    let nineteen_eighty_four = insert_book(pool, "1984", 1949, orwell).await;

    Catalog {
        achebe,
        orwell,
        things_fall_apart,
        nineteen_eighty_four,
    }
}

/// Registers `username` and returns the response status.
pub async fn register(addr: &SocketAddr, client: &reqwest::Client, username: &str) -> StatusCode {
    let payload = RegisterPayload {
        username: username.to_string(),
        email: Some(format!("{username}@example.com")),
        password: TEST_PASSWORD.to_string(),
    };
    client
        .post(format!("http://{addr}/api/accounts/register/"))
        .json(&payload)
        .send()
        .await
        .expect("Failed to register user")
        .status()
}

/// Helper to register and login a test user, returning their auth token.
pub async fn get_auth_token(addr: &SocketAddr, client: &reqwest::Client) -> String {
    assert_eq!(
        register(addr, client, "testuser").await,
        StatusCode::CREATED,
        "Registration failed"
    );

    let response = client
        .post(format!("http://{addr}/api/accounts/login/"))
        .json(&serde_json::json!({ "username": "testuser", "password": TEST_PASSWORD }))
        .send()
        .await
        .expect("Failed to login user");

    assert_eq!(response.status(), StatusCode::OK, "Login request did not return 200 OK");

    let login_response: LoginResponse = response
        .json()
        .await
        .expect("Failed to parse login response");
    login_response.token
}
