//! Shared application state.

use std::sync::Arc;

use axum::extract::State;

use kvmcpu_core::collector::Scraper;

pub(crate) struct ExporterState {
    pub(crate) scraper: Scraper,
    pub(crate) telemetry_path: String,
}

pub(crate) type AppState = Arc<ExporterState>;

pub(crate) type SharedState = State<AppState>;
