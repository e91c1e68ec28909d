use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Screen capture error: {0}")]
    Capture(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Template unavailable: {0}")]
    TemplateUnavailable(String),

    #[error("Input driver error: {0}")]
    Input(String),

    #[error("Vision model error: {0}")]
    Vision(String),

    #[error("Playback is already running")]
    AlreadyPlaying,

    #[error("Start index {index} is out of range for {total} steps")]
    InvalidStartIndex { index: usize, total: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type ReplayResult<T> = Result<T, ReplayError>;
