use crate::crops::Crop;
use crate::error::{CollectError, SearchError};
use crate::models::{CatalogEntry, DiseaseDetail};
use async_trait::async_trait;

/// External disease catalog.
#[async_trait]
pub trait DiseaseCatalog: Send + Sync {
    async fn list_diseases(&self, crop: Crop) -> Result<Vec<CatalogEntry>, CollectError>;

    /// `Ok(None)` when the catalog knows no detail for the key.
    async fn disease_detail(&self, source_id: &str) -> Result<Option<DiseaseDetail>, CollectError>;

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, CollectError>;
}

/// Generative text backend used for grounded detail answers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, SearchError>;
}
