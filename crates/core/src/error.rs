use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("unexpected catalog response: {0}")]
    CatalogResponse(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("unsupported crop '{crop}'")]
    UnsupportedCrop { crop: String },

    #[error("no index has been built for crop '{crop}'")]
    IndexNotFound { crop: String },

    #[error("external service {backend} failed: {details}")]
    ExternalService { backend: String, details: String },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SearchError {
    pub(crate) fn external(backend: &str, details: impl Into<String>) -> Self {
        Self::ExternalService {
            backend: backend.to_string(),
            details: details.into(),
        }
    }
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;
