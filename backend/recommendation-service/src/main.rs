use anyhow::Context;
use recommendation_service::models::RecommendationRequest;
use recommendation_service::{AppError, Artifacts, Config, RecommendationService};
use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing::{error, info, info_span, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load config")?;
    init_tracing(&config.service.log_format);

    info!(
        "Starting {} ({})",
        config.service.name, config.service.environment
    );

    config.validate().context("Invalid configuration")?;

    let artifacts = Artifacts::load(&config.model).context("Failed to load model artifacts")?;
    let service = RecommendationService::from_artifacts(config, artifacts);

    if !service.is_ready() {
        warn!("Service started without every component loaded");
    }

    serve_lines(&service, io::stdin().lock(), io::stdout().lock())
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or_else(|_| log_format.eq_ignore_ascii_case("json"));

    // stdout carries responses, so logs go to stderr
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr))
            .with(filter)
            .init();
    }
}

/// One JSON request per input line, one JSON response per output line.
/// The literal line `status` prints the service status instead.
fn serve_lines<R: BufRead, W: Write>(
    service: &RecommendationService,
    input: R,
    mut output: W,
) -> anyhow::Result<()> {
    for line in input.lines() {
        let line = line.context("Failed to read request")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request_id = Uuid::new_v4();
        let span = info_span!("recommend", %request_id);
        let _guard = span.enter();

        let reply = if line.eq_ignore_ascii_case("status") {
            serde_json::to_value(service.status())?
        } else {
            handle_request(service, line)
        };

        serde_json::to_writer(&mut output, &reply)?;
        writeln!(output)?;
        output.flush()?;
    }

    Ok(())
}

fn handle_request(service: &RecommendationService, line: &str) -> serde_json::Value {
    let request: RecommendationRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Malformed request");
            return error_reply(&AppError::InvalidInput(e.to_string()));
        }
    };

    match service.recommend(&request) {
        Ok(response) => serde_json::to_value(response).unwrap_or_else(|e| {
            error_reply(&AppError::Internal(format!("Failed to encode response: {}", e)))
        }),
        Err(e) => {
            error!(user_id = request.user_id, error = %e, "Recommendation failed");
            error_reply(&e)
        }
    }
}

fn error_reply(err: &AppError) -> serde_json::Value {
    json!({
        "error": err.to_string(),
        "retryable": err.is_retryable(),
    })
}
