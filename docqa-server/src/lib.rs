//! HTTP API for the docqa retrieval engine.
//!
//! Routes are served both at the root and under `/api`:
//!
//! - `GET /`: welcome message
//! - `POST /ingest`: multipart upload (`files`, optional `replace`)
//! - `POST /query`: `{"question": "...", "k": 5}`
//! - `POST /reset`: discard every stored document

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use config::ServerConfig;
pub use server::{AppState, app_router, build_engine, run_server};
