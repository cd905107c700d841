use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

const DEFAULT_DISEASE_API_URL: &str =
    "https://api-inference.huggingface.co/models/ozair23/mobilenet_v2_1.0_224-finetuned-plantdisease";

/// Leaf detection and plant disease diagnosis service
#[derive(Parser, Debug, Clone)]
#[command(name = "leaf-diagnosis-service")]
#[command(version)]
#[command(about = "HTTP service that detects leaves and diagnoses plant diseases")]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Maximum request body size in megabytes
    #[arg(long, env = "BODY_LIMIT_MB", default_value_t = 5)]
    pub body_limit_mb: usize,

    /// Frozen TensorFlow graph of the leaf classifier
    #[arg(long, env = "LEAF_MODEL_PATH", default_value = "./model/leaf_classifier.pb")]
    pub model_path: PathBuf,

    /// Where to fetch the model from when it is not on disk
    #[arg(long, env = "LEAF_MODEL_URL")]
    pub model_url: Option<String>,

    /// Bearer token for the model download
    #[arg(long, env = "MODEL_DOWNLOAD_TOKEN", hide_env_values = true)]
    pub model_download_token: Option<String>,

    /// Name of the graph's input operation
    #[arg(long, env = "LEAF_MODEL_INPUT_OP", default_value = "x")]
    pub input_op: String,

    /// Name of the graph's output operation
    #[arg(long, env = "LEAF_MODEL_OUTPUT_OP", default_value = "Identity")]
    pub output_op: String,

    /// Hosted plant disease inference endpoint
    #[arg(long, env = "DISEASE_API_URL", default_value = DEFAULT_DISEASE_API_URL)]
    pub disease_api_url: String,

    /// Bearer token for the disease inference endpoint
    #[arg(long, env = "DISEASE_API_TOKEN", hide_env_values = true)]
    pub disease_api_token: Option<String>,

    /// Timeout for a single disease inference request
    #[arg(long, env = "DISEASE_API_TIMEOUT_SECS", default_value_t = 30)]
    pub disease_api_timeout_secs: u64,

    /// Initial delay between disease inference attempts
    #[arg(long, env = "DISEASE_API_BACKOFF_MS", default_value_t = 500)]
    pub retry_backoff_ms: u64,

    /// Directory for temporary upload files
    #[arg(long, env = "UPLOAD_DIR", default_value = ".")]
    pub upload_dir: PathBuf,
}

impl Config {
    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb * 1024 * 1024
    }

    pub fn disease_api_timeout(&self) -> Duration {
        Duration::from_secs(self.disease_api_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
