pub mod buffers;
pub mod clip;
pub mod detector;
pub mod proctor;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wav encode error: {0}")]
    Wav(#[from] hound::Error),
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("detector error: {0}")]
    Detector(String),
    #[error("encoder failed: {0}")]
    Encoder(String),
}
