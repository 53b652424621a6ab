// --- File: backend/src/web_server.rs ---

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::{auth, authors, books, openapi};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub app_config: AppConfig,
}

pub async fn run_server(app_state: AppState) -> anyhow::Result<()> {
    let web = &app_state.app_config.web;
    let addr: SocketAddr = format!("{}:{}", web.addr, web.port).parse()?;

    let app = create_router(app_state);
    tracing::info!("Serving API at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    match HeaderValue::from_str(origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
            layer
        }
    }
}

pub fn create_router(app_state: AppState) -> Router {
    // Reads are open to anyone.
    let public_catalog = Router::new()
        .route("/books/", get(books::list_books))
        .route("/books/{id}/", get(books::get_book))
        .route("/authors/", get(authors::list_authors))
        .route("/authors/{id}/", get(authors::get_author));

    // Writes need a token. Update and delete answer on both URL styles.
    let protected_catalog = Router::new()
        .route("/books/create/", post(books::create_book))
        .route("/books/update/{id}/", put(books::update_book))
        .route("/books/{id}/update/", put(books::update_book))
        .route("/books/delete/{id}/", delete(books::delete_book))
        .route("/books/{id}/delete/", delete(books::delete_book))
        .route("/authors/create/", post(authors::create_author))
        .route("/authors/update/{id}/", put(authors::update_author))
        .route("/authors/{id}/update/", put(authors::update_author))
        .route("/authors/delete/{id}/", delete(authors::delete_author))
        .route("/authors/{id}/delete/", delete(authors::delete_author))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::auth_middleware,
        ));

    let account_routes = Router::new()
        .route("/register/", post(auth::register))
        .route("/login/", post(auth::login))
        .merge(
            Router::new()
                .route("/profile/", get(auth::profile))
                .route_layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    auth::auth_middleware,
                )),
        );

    let cors = cors_layer(&app_state.app_config.web.cors_origin);

    Router::new()
        .nest(
            "/api",
            public_catalog
                .merge(protected_catalog)
                .nest("/accounts", account_routes)
                .route("/openapi.json", get(openapi::openapi_json)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}
