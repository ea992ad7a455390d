use crate::crops::Crop;
use crate::embeddings::{cosine_distance, Embedder};
use crate::error::SearchError;
use crate::models::{DiseaseRecord, DocumentMetadata, IndexManifest, IndexedDocument, MetadataFilter};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "index.json";

/// Per-crop vector indexes persisted under one root directory.
///
/// Each crop lives in `<root>/crop_<code>/`. Builds are written to a hidden
/// sibling directory and renamed into place, so [`CropIndexStore::exists`]
/// never observes a partial index.
pub struct CropIndexStore {
    root: PathBuf,
    embedder: Arc<dyn Embedder>,
}

impl CropIndexStore {
    pub fn new(root: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            root: root.into(),
            embedder,
        }
    }

    pub fn location(&self, crop: Crop) -> PathBuf {
        self.root.join(crop.collection_name())
    }

    /// Cheap presence check; does not read the index.
    pub fn exists(&self, crop: &str) -> Result<bool, SearchError> {
        let crop = Crop::resolve(crop)?;
        Ok(self.exists_for(crop))
    }

    pub fn exists_for(&self, crop: Crop) -> bool {
        self.location(crop).is_dir()
    }

    /// Embeds `records` and publishes them as the crop's index, replacing any
    /// previous one. Callers serialize builds per crop.
    pub async fn build(&self, crop: &str, records: &[DiseaseRecord]) -> Result<CropIndex, SearchError> {
        let crop = Crop::resolve(crop)?;
        self.build_for(crop, records).await
    }

    pub async fn build_for(&self, crop: Crop, records: &[DiseaseRecord]) -> Result<CropIndex, SearchError> {
        if records.is_empty() {
            return Err(SearchError::Validation(format!(
                "no disease records to index for {}",
                crop.display_name()
            )));
        }

        let collection = crop.collection_name();
        info!(crop = %crop, collection = %collection, records = records.len(), "building crop index");

        let contents: Vec<String> = records.iter().map(DiseaseRecord::compose_content).collect();
        let texts: Vec<&str> = contents.iter().map(String::as_str).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        if embeddings.len() != records.len() {
            return Err(SearchError::external(
                self.embedder.model_id(),
                format!(
                    "embedding count {} doesn't match record count {}",
                    embeddings.len(),
                    records.len()
                ),
            ));
        }

        let documents = records
            .iter()
            .zip(contents)
            .zip(embeddings)
            .map(|((record, content), embedding)| IndexedDocument {
                id: make_document_id(crop, &record.name, &content),
                metadata: DocumentMetadata {
                    disease_name: record.name.clone(),
                    crop_name: crop.display_name().to_string(),
                    crop_code: crop.code().to_string(),
                    has_ecology: !record.ecology.trim().is_empty(),
                    has_symptoms: !record.symptoms.trim().is_empty(),
                    has_prevention: !record.prevention.trim().is_empty(),
                    image_path: record.image_path.clone().unwrap_or_default(),
                },
                content,
                embedding,
            })
            .collect::<Vec<_>>();

        let manifest = IndexManifest {
            collection: collection.clone(),
            crop_name: crop.display_name().to_string(),
            crop_code: crop.code().to_string(),
            embedding_model: self.embedder.model_id().to_string(),
            dimensions: self.embedder.dimensions(),
            built_at: Utc::now(),
            documents,
        };

        self.publish(crop, &manifest).await?;
        info!(crop = %crop, collection = %collection, documents = manifest.documents.len(), "crop index published");

        Ok(CropIndex { crop, manifest })
    }

    async fn publish(&self, crop: Crop, manifest: &IndexManifest) -> Result<(), SearchError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let staging = self
            .root
            .join(format!(".building-{}-{}", crop.collection_name(), uuid::Uuid::new_v4()));
        let written = async {
            tokio::fs::create_dir_all(&staging).await?;
            let bytes = serde_json::to_vec(manifest)?;
            tokio::fs::write(staging.join(MANIFEST_FILE), bytes).await?;
            Ok::<_, SearchError>(())
        }
        .await;

        if let Err(error) = written {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(error);
        }

        let target = self.location(crop);
        let stale = if target.exists() {
            let stale = self
                .root
                .join(format!(".stale-{}-{}", crop.collection_name(), uuid::Uuid::new_v4()));
            tokio::fs::rename(&target, &stale).await?;
            Some(stale)
        } else {
            None
        };

        if let Err(error) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            if let Some(stale) = &stale {
                let _ = tokio::fs::rename(stale, &target).await;
            }
            return Err(error.into());
        }

        if let Some(stale) = stale {
            if let Err(error) = tokio::fs::remove_dir_all(&stale).await {
                warn!(path = %stale.display(), %error, "failed to remove replaced index");
            }
        }

        Ok(())
    }

    pub async fn load(&self, crop: &str) -> Result<CropIndex, SearchError> {
        let crop = Crop::resolve(crop)?;
        self.load_for(crop).await
    }

    pub async fn load_for(&self, crop: Crop) -> Result<CropIndex, SearchError> {
        if !self.exists_for(crop) {
            return Err(SearchError::IndexNotFound {
                crop: crop.display_name().to_string(),
            });
        }

        // The directory can vanish between the check and the read during a rebuild.
        let bytes = match tokio::fs::read(self.location(crop).join(MANIFEST_FILE)).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(SearchError::IndexNotFound {
                    crop: crop.display_name().to_string(),
                });
            }
            Err(error) => return Err(error.into()),
        };
        let manifest: IndexManifest = serde_json::from_slice(&bytes)?;

        if manifest.embedding_model != self.embedder.model_id() {
            warn!(
                crop = %crop,
                indexed_with = %manifest.embedding_model,
                querying_with = %self.embedder.model_id(),
                "embedding model differs from the one used at build time"
            );
        }
        debug!(crop = %crop, documents = manifest.documents.len(), "crop index loaded");

        Ok(CropIndex { crop, manifest })
    }
}

fn make_document_id(crop: Crop, disease_name: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(crop.code().as_bytes());
    hasher.update(disease_name.as_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A loaded crop index. Read-only.
#[derive(Debug, Clone)]
pub struct CropIndex {
    crop: Crop,
    manifest: IndexManifest,
}

impl CropIndex {
    pub fn crop(&self) -> Crop {
        self.crop
    }

    pub fn collection(&self) -> &str {
        &self.manifest.collection
    }

    pub fn embedding_model(&self) -> &str {
        &self.manifest.embedding_model
    }

    pub fn documents(&self) -> &[IndexedDocument] {
        &self.manifest.documents
    }

    pub fn len(&self) -> usize {
        self.manifest.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.documents.is_empty()
    }

    /// Nearest documents to `query_vector` by cosine distance, closest first.
    /// Equal distances keep build order.
    pub fn similarity_search_with_score(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<(&IndexedDocument, f32)> {
        let mut scored: Vec<(&IndexedDocument, f32)> = self
            .manifest
            .documents
            .iter()
            .filter(|document| filter.map_or(true, |filter| filter.matches(&document.metadata)))
            .map(|document| (document, cosine_distance(query_vector, &document.embedding)))
            .collect();

        scored.sort_by(|left, right| left.1.total_cmp(&right.1));
        scored.truncate(k);
        scored
    }
}
