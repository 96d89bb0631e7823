//! HTTP API for installation gating and invoice numbering.
//!
//! A thin axum shell over `stockgate-postgres`: handlers parse JSON, call one
//! service operation, and map [`CoreError`](stockgate_core::CoreError) to a status
//! and `{code, message, ...context}` body through [`AppError`].
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  stockgate-web (axum)                    │  ← JSON, status codes, tracing
//! ├──────────────────────────────────────────┤
//! │  stockgate-postgres                      │  ← transactions, locks, retries
//! ├──────────────────────────────────────────┤
//! │  stockgate-core                          │  ← rules, formats, errors
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use stockgate_web::{Config, app, build_router};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let pool = app::connect(&config.database).await?;
//! let state = app::build_state(pool, &config).await?;
//!
//! let listener = tokio::net::TcpListener::bind(config.server.bind_address()).await?;
//! axum::serve(listener, build_router(state)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};
pub use routes::build_router;
pub use state::AppState;
