use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod model;
mod remote;
mod response;
mod routes;
mod upload;
mod utils;

use config::Config;
use model::{LeafClassifier, TensorflowLeafModel};
use remote::{HuggingFaceClient, RetryPolicy};
use routes::AppState;
use utils::ensure_model_file;

fn main() -> anyhow::Result<()> {
    // keep TensorFlow's native logging out of the service log; set before
    // the runtime spawns any threads
    if std::env::var_os("TF_CPP_MIN_LOG_LEVEL").is_none() {
        std::env::set_var("TF_CPP_MIN_LOG_LEVEL", "3");
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = Config::parse();
    info!("Leaf diagnosis service v{}", env!("CARGO_PKG_VERSION"));
    info!("  Model path:  {:?}", config.model_path);
    info!("  Disease API: {}", config.disease_api_url);
    info!("  Upload dir:  {:?}", config.upload_dir);

    let leaf_model = load_leaf_model(&config).await;

    let disease_classifier = HuggingFaceClient::new(
        &config.disease_api_url,
        config.disease_api_token.as_deref(),
        config.disease_api_timeout(),
    )?;
    if config.disease_api_token.is_none() {
        warn!("DISEASE_API_TOKEN not set, disease lookups are unauthenticated");
    }

    let state = Arc::new(AppState {
        leaf_model,
        disease_classifier: Arc::new(disease_classifier),
        retry: RetryPolicy::with_base_delay(config.retry_backoff()),
        upload_dir: config.upload_dir.clone(),
    });

    let app = routes::router(state, config.body_limit_bytes());

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

/// Loads the leaf model once. A failure leaves the service running without
/// it so `/health` can report the problem.
async fn load_leaf_model(config: &Config) -> Option<Arc<dyn LeafClassifier>> {
    if let Err(err) = ensure_model_file(
        &config.model_path,
        config.model_url.as_deref(),
        config.model_download_token.as_deref(),
    )
    .await
    {
        error!("Failed to fetch model: {}", err);
        return None;
    }

    info!("Loading TensorFlow model...");
    let path = config.model_path.clone();
    let input_op = config.input_op.clone();
    let output_op = config.output_op.clone();
    let loaded = tokio::task::spawn_blocking(move || {
        TensorflowLeafModel::load(&path, &input_op, &output_op)
    })
    .await;

    match loaded {
        Ok(Ok(model)) => {
            info!("Model loaded successfully.");
            let model: Arc<dyn LeafClassifier> = Arc::new(model);
            Some(model)
        }
        Ok(Err(err)) => {
            error!("Failed to load model: {}", err);
            None
        }
        Err(err) => {
            error!("Model loading task failed: {}", err);
            None
        }
    }
}
