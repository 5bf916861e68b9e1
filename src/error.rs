use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReceiptError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Recognition timed out after {seconds}s")]
    RecognitionTimeout { seconds: u64 },

    #[error("Failed to initialize recognition engine: {0}")]
    Initialization(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ReceiptError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ReceiptError::Decode(_) => (StatusCode::UNPROCESSABLE_ENTITY, "DECODE_ERROR"),
            ReceiptError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENCODE_ERROR"),
            ReceiptError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            ReceiptError::InvalidImage(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_IMAGE"),
            ReceiptError::Recognition(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "RECOGNITION_ERROR")
            }
            ReceiptError::RecognitionTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "RECOGNITION_TIMEOUT")
            }
            ReceiptError::Initialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INIT_ERROR"),
            ReceiptError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ReceiptError::ImageTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "IMAGE_TOO_LARGE")
            }
            ReceiptError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            ReceiptError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ReceiptError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
