pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod models;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use crate::core::{bootstrap, config::Settings, state::AppState, telemetry};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let grader = bootstrap::build_grader(&settings)?;
    let state = AppState::new(settings, grader.clone());

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Visual grader API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::graceful(grader)).await?;

    tracing::info!("Visual grader API stopped");
    Ok(())
}
