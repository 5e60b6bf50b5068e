use cardkit_core::ErrorKind;
use thiserror::Error;

/// Template failure, tagged with the component that raised it.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("component {component} failed: {message}")]
pub struct TemplateError {
    pub component: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("rasterization failed: {0}")]
    Raster(String),

    #[error("no fonts available to the rasterizer")]
    FontsUnavailable,

    #[error("renderer setup failed: {0}")]
    Setup(String),
}

impl RenderError {
    /// Wire classification; validation failures are not worth a retry.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::UnknownComponent(_)
            | RenderError::InvalidRequest(_)
            | RenderError::Template(_) => ErrorKind::Validation,
            RenderError::Raster(_) | RenderError::FontsUnavailable | RenderError::Setup(_) => {
                ErrorKind::Render
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("invalid asset URL: {0}")]
    InvalidUrl(String),

    #[error("asset of {0} bytes is too large")]
    TooLarge(usize),

    #[error("emoji scale {0} out of range")]
    InvalidScale(f32),

    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
