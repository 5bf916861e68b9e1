use crate::enhance::{EnhanceOptions, SkewParams};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "receipt-ocr-server")]
#[command(about = "Receipt enhancement and OCR server with expense extraction")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "RECEIPT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "RECEIPT_PORT", default_value = "9292")]
    pub port: u16,

    /// Default language for recognition (e.g., "eng", "deu", "fra")
    #[arg(long, env = "RECEIPT_DEFAULT_LANGUAGE", default_value = "eng")]
    pub default_language: String,

    /// Maximum file size in bytes (default: 50MB)
    #[arg(long, env = "RECEIPT_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Recognition deadline in seconds
    #[arg(long, env = "RECEIPT_RECOGNITION_TIMEOUT", default_value = "60")]
    pub recognition_timeout: u64,

    /// Directory for per-stage debug images (disabled when unset)
    #[arg(long, env = "RECEIPT_DEBUG_CAPTURE_DIR")]
    pub debug_capture_dir: Option<PathBuf>,

    /// JSON file for record persistence (in-memory store when unset)
    #[arg(long, env = "RECEIPT_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Uniform rescale factor applied before all other stages
    #[arg(long, env = "RECEIPT_RESCALE_FACTOR", default_value = "1.2")]
    pub rescale_factor: f32,

    /// Skew search range in degrees (inclusive, symmetric about zero)
    #[arg(long, env = "RECEIPT_SKEW_LIMIT", default_value = "5.0")]
    pub skew_limit: f32,

    /// Skew search step in degrees
    #[arg(long, env = "RECEIPT_SKEW_STEP", default_value = "0.5")]
    pub skew_step: f32,

    /// Disable the aspect-heuristic orientation rotation
    #[arg(long, env = "RECEIPT_NO_ORIENTATION_ROTATE")]
    pub no_orientation_rotate: bool,

    /// Path to tessdata directory (uses TESSDATA_PREFIX env var if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub default_language: String,
    pub max_file_size: usize,
    pub recognition_timeout_secs: u64,
    /// When set, each request writes its per-stage images under this
    /// directory (one subdirectory per receipt id).
    pub debug_capture_dir: Option<PathBuf>,
    /// When set, records persist to a JSON file here; otherwise in memory.
    pub store_path: Option<PathBuf>,
    pub tessdata_path: Option<String>,
    pub enhance: EnhanceOptions,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let enhance = EnhanceOptions {
            rescale_factor: args.rescale_factor,
            rotate_orientation: !args.no_orientation_rotate,
            skew: SkewParams {
                limit: args.skew_limit,
                step: args.skew_step,
                ..SkewParams::default()
            },
            debug_capture: args.debug_capture_dir.is_some(),
            ..EnhanceOptions::default()
        };

        Self {
            host: args.host,
            port: args.port,
            default_language: args.default_language,
            max_file_size: args.max_file_size,
            recognition_timeout_secs: args.recognition_timeout,
            debug_capture_dir: args.debug_capture_dir,
            store_path: args.store_path,
            tessdata_path: args.tessdata_path,
            enhance,
        }
    }
}
