use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use echoscribe::config::settings::Settings;
use echoscribe::services::stt;
use echoscribe::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("echoscribe=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env().context("loading settings")?;
    let addr = settings.bind_addr();
    let loader = stt::loader_from_settings(&settings);

    tracing::info!(
        upload_dir = %settings.upload_dir.display(),
        data_dir = %settings.data_dir.display(),
        backend = ?settings.stt_backend,
        max_upload_bytes = settings.max_upload_bytes,
        "starting echoscribe"
    );

    let state = AppState::new(settings, loader)
        .await
        .context("preparing storage directories")?;

    let router = app(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
