use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::error::ApiError;
use crate::model::{classify_image, LeafClassifier, Verdict};
use crate::remote::{top_prediction, DiseaseClassifier, RetryPolicy};
use crate::response::{ClassifyResponse, HealthResponse};
use crate::upload::{read_upload, TempUpload};

/// Read-only state shared by all requests.
pub struct AppState {
    /// `None` when the model failed to load at startup.
    pub leaf_model: Option<Arc<dyn LeafClassifier>>,
    pub disease_classifier: Arc<dyn DiseaseClassifier>,
    pub retry: RetryPolicy,
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn model_loaded(&self) -> bool {
        self.leaf_model.is_some()
    }
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/classify", post(classify))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /classify - leaf check followed by disease lookup
async fn classify(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let leaf_model = state.leaf_model.clone().ok_or(ApiError::ModelUnavailable)?;

    let mut multipart = multipart.map_err(|_| ApiError::MissingFilePart)?;
    let image = read_upload(&mut multipart).await?;

    let upload = TempUpload::persist(&state.upload_dir, &image)
        .await
        .map_err(|err| ApiError::Internal(format!("failed to store upload: {}", err)))?;

    let path = upload.path().to_path_buf();
    let verdict = tokio::task::spawn_blocking(move || classify_image(leaf_model.as_ref(), &path))
        .await
        .map_err(|err| ApiError::Internal(format!("classification task failed: {}", err)))?;

    match verdict {
        Verdict::NotLeaf => Ok(Json(ClassifyResponse::not_leaf())),
        Verdict::Error => Err(ApiError::Classification),
        Verdict::Leaf => {
            let top = top_prediction(
                state.disease_classifier.as_ref(),
                upload.path(),
                &state.retry,
            )
            .await;
            info!(label = %top.label, score = top.score, "diagnosis complete");
            Ok(Json(ClassifyResponse::diagnosis(top)))
        }
    }
}

/// GET /health - liveness and model status
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(state.model_loaded()))
}
