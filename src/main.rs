use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use image_captioner::{
    logging::{self, LogFile},
    router,
    uploads::UploadDir,
    AppState, Config, RemoteCaptionEngine,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init(&config.log_file, &config.log_level)?;

    info!("Starting image captioner.");

    let uploads = UploadDir::create(&config.upload_dir)
        .await
        .with_context(|| format!("cannot create {}", config.upload_dir.display()))?;

    // Reap anything a previous run left behind.
    match uploads.sweep(config.cleanup_max_age).await {
        Ok(removed) => info!("Startup cleanup removed {} stale uploads", removed),
        Err(e) => warn!("Error during cleanup: {}", e),
    }

    let engine = RemoteCaptionEngine::new(config.engine.clone())?;

    let state = AppState {
        uploads,
        engine: Arc::new(engine),
        logs: LogFile::new(&config.log_file),
    };
    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("cannot bind {}", config.addr))?;

    info!("Server running on http://{}", config.addr);

    axum::serve(listener, app).await?;
    Ok(())
}
