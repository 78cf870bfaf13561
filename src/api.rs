use actix_web::{HttpResponse, Result, http::StatusCode, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::engine::AdaptiveScraper;
use crate::error::{ErrorKind, ScrapeError};
use crate::fetch::PageFetcher;
use crate::session::SessionLauncher;

/// Shared state of the HTTP service; scrapes share nothing mutable.
pub struct AppState<F, L> {
    pub scraper: AdaptiveScraper<F, L>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

pub async fn scrape_handler<F, L>(
    state: web::Data<AppState<F, L>>,
    req: web::Json<ScrapeRequest>,
) -> Result<HttpResponse>
where
    F: PageFetcher + 'static,
    L: SessionLauncher + 'static,
{
    log::info!("Received scrape request for {}", req.url);

    match state.scraper.scrape(&req.url).await {
        Ok(response) => {
            log::info!(
                "Scrape of {} complete: {:?}, {} section(s), {} error(s)",
                req.url,
                response.method,
                response.result.sections.len(),
                response.result.errors.len()
            );
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            log::error!("Scrape of {} failed: {}", req.url, e);
            Ok(error_response(&e))
        }
    }
}

fn error_response(error: &ScrapeError) -> HttpResponse {
    let status = match error {
        ScrapeError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
        ScrapeError::FetchFailure { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(ErrorBody {
        error: error.to_string(),
        kind: error.kind(),
    })
}

/// Register the service routes for one scraper type
pub fn configure<F, L>(cfg: &mut web::ServiceConfig)
where
    F: PageFetcher + 'static,
    L: SessionLauncher + 'static,
{
    cfg.route("/healthz", web::get().to(health_check))
        .route("/scrape", web::post().to(scrape_handler::<F, L>));
}
