//! HTTP request handlers: telemetry endpoint and landing page.

use std::sync::Arc;

use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use kvmcpu_core::collector::encode_text;

use crate::state::SharedState;

// ============================================================
// Metrics
// ============================================================

pub(crate) async fn handle_metrics(state: SharedState) -> Response {
    let state = Arc::clone(&state.0);
    // Collectors do blocking kernel reads.
    let scraped = tokio::task::spawn_blocking(move || encode_text(&state.scraper.scrape())).await;

    match scraped {
        Ok(Ok((content_type, body))) => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response()
        }
        Err(e) => {
            error!(error = %e, "scrape task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "scrape failed").into_response()
        }
    }
}

// ============================================================
// Index
// ============================================================

pub(crate) async fn handle_index(state: SharedState) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>kvmcpu exporter</title></head>\n<body>\n\
         <h1>kvmcpu exporter</h1>\n<p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n</html>\n",
        path = state.0.telemetry_path
    ))
}
