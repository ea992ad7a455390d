use crate::detail::DEFAULT_DETAIL_CANDIDATES;
use crate::error::SearchError;
use crate::search::DEFAULT_TOP_K;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DoctorConfig {
    pub index_dir: PathBuf,
    pub image_dir: PathBuf,
    pub default_top_k: usize,
    pub detail_candidates: usize,
    pub request_timeout: Duration,
    pub embedding_model: String,
    pub chat_model: String,
    pub chat_temperature: f32,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("./crop_index"),
            image_dir: PathBuf::from("./crop_images"),
            default_top_k: DEFAULT_TOP_K,
            detail_candidates: DEFAULT_DETAIL_CANDIDATES,
            request_timeout: Duration::from_secs(30),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            chat_temperature: 0.2,
        }
    }
}

impl DoctorConfig {
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.default_top_k == 0 {
            return Err(SearchError::Validation("default_top_k must be at least 1".to_string()));
        }
        if self.detail_candidates == 0 {
            return Err(SearchError::Validation(
                "detail_candidates must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(SearchError::Validation("request_timeout must be positive".to_string()));
        }
        Ok(())
    }
}
