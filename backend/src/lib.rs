// --- File: backend/src/lib.rs ---

// This file acts as the entry point for the `backend` library.
// The modules are public so the integration tests can build the router
// and reach the database helpers directly.
pub mod auth;
pub mod authors;
pub mod books;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod filters;
pub mod openapi;
pub mod web_server;
