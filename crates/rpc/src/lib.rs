//! HTTP surface of the customer category service.
//!
//! `POST /predict` runs one request through the prediction pipeline; `GET /`,
//! `GET /api/test`, `GET /version` and `GET /metrics` describe the running
//! process.

pub mod server;

pub use server::{build_router, shutdown_signal, start_server, AppState, ServerConfig};
