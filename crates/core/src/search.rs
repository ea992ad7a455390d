use crate::crops::Crop;
use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{IndexedDocument, MetadataFilter, SearchHit};
use crate::store::CropIndexStore;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_TOP_K: usize = 3;

/// Top-K disease lookup restricted to one crop's index.
pub struct SimilaritySearchEngine {
    store: Arc<CropIndexStore>,
    embedder: Arc<dyn Embedder>,
}

impl SimilaritySearchEngine {
    pub fn new(store: Arc<CropIndexStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Searches `crop` with an already normalized query.
    ///
    /// A crop without an index yields an empty list; the caller builds it and
    /// retries. Results never exceed `top_k` and are never padded after the
    /// crop re-check drops a hit.
    pub async fn search(
        &self,
        crop: &str,
        processed_query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let crop = Crop::resolve(crop)?;
        if top_k == 0 {
            return Err(SearchError::Validation("top_k must be at least 1".to_string()));
        }
        if processed_query.trim().is_empty() {
            return Err(SearchError::Validation("query is empty".to_string()));
        }

        let index = match self.store.load_for(crop).await {
            Ok(index) => index,
            Err(SearchError::IndexNotFound { .. }) => {
                warn!(crop = %crop, "no index for crop yet");
                return Ok(Vec::new());
            }
            Err(error) => return Err(error),
        };

        let query_vector = self.embedder.embed_one(processed_query).await?;
        let filter = MetadataFilter::crop(crop.display_name());
        let matches = index.similarity_search_with_score(&query_vector, top_k, Some(&filter));

        let hits = retain_crop_matches(crop, matches);
        info!(crop = %crop, query = %processed_query, hits = hits.len(), "similarity search finished");
        Ok(hits)
    }
}

/// Drops any match whose metadata names a different crop, even when the
/// store already filtered on it.
pub fn retain_crop_matches(crop: Crop, matches: Vec<(&IndexedDocument, f32)>) -> Vec<SearchHit> {
    matches
        .into_iter()
        .filter(|(document, _)| {
            let same_crop = document.metadata.crop_name == crop.display_name();
            if !same_crop {
                warn!(
                    crop = %crop,
                    found = %document.metadata.crop_name,
                    disease = %document.metadata.disease_name,
                    "discarding hit from another crop"
                );
            }
            same_crop
        })
        .map(|(document, score)| SearchHit {
            disease_name: document.metadata.disease_name.clone(),
            score,
            content: document.content.clone(),
            image_path: document.metadata.image_path.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;
    use crate::store::tests::{record, KeywordEmbedder};
    use crate::text::normalize_query;
    use tempfile::tempdir;

    fn engine(root: &std::path::Path) -> (SimilaritySearchEngine, Arc<CropIndexStore>, Arc<KeywordEmbedder>) {
        let embedder = Arc::new(KeywordEmbedder::new());
        let store = Arc::new(CropIndexStore::new(root, embedder.clone()));
        (SimilaritySearchEngine::new(store.clone(), embedder.clone()), store, embedder)
    }

    #[tokio::test]
    async fn closer_symptoms_rank_first() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (engine, store, _) = engine(dir.path());
        store
            .build(
                "장미",
                &[
                    record(Crop::Rose, "노균병", "잎에 노란 반점"),
                    record(Crop::Rose, "흑반병", "잎에 검은 반점 확산"),
                ],
            )
            .await?;

        let hits = engine
            .search("장미", &normalize_query("잎에 검은 반점이 생겨요"), 2)
            .await?;

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].disease_name, "흑반병");
        assert_eq!(hits[1].disease_name, "노균병");
        assert!(hits[0].score <= hits[1].score);
        assert!(hits[0].content.starts_with("병명: 흑반병"));
        Ok(())
    }

    #[tokio::test]
    async fn search_never_crosses_crops() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (engine, store, _) = engine(dir.path());
        store
            .build("장미", &[record(Crop::Rose, "흑반병", "잎에 검은 반점")])
            .await?;
        store
            .build(
                "국화",
                &[
                    record(Crop::Chrysanthemum, "흰녹병", "잎에 검은 반점"),
                    record(Crop::Chrysanthemum, "흰가루병", "흰 가루 잎"),
                ],
            )
            .await?;

        for query in ["검은 반점", "흰 가루", "잎", "줄기 시들"] {
            let hits = engine.search("장미", query, 5).await?;
            assert!(hits.len() <= 1);
            assert!(hits.iter().all(|hit| hit.disease_name == "흑반병"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn result_count_is_bounded_by_top_k() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (engine, store, _) = engine(dir.path());
        let records: Vec<_> = ["탄저병", "흰가루병", "노균병", "흑반병"]
            .iter()
            .map(|name| record(Crop::Rose, name, "잎 반점"))
            .collect();
        store.build("장미", &records).await?;

        for k in 1..=6 {
            let hits = engine.search("장미", "잎 반점", k).await?;
            assert_eq!(hits.len(), k.min(records.len()));
        }
        Ok(())
    }

    #[tokio::test]
    async fn missing_index_yields_empty_results() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (engine, _, embedder) = engine(dir.path());
        let hits = engine.search("과꽃", "잎 반점", 3).await?;
        assert!(hits.is_empty());
        assert_eq!(embedder.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn index_directory_without_manifest_yields_empty_results() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (engine, store, _) = engine(dir.path());
        std::fs::create_dir_all(store.location(Crop::ChinaAster))?;

        let hits = engine.search("과꽃", "잎 반점", 3).await?;
        assert!(hits.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_backend_calls() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (engine, _, embedder) = engine(dir.path());

        let unsupported = engine.search("존재하지않는작물", "잎 반점", 3).await;
        assert!(matches!(unsupported, Err(SearchError::UnsupportedCrop { .. })));

        let zero_k = engine.search("장미", "잎 반점", 0).await;
        assert!(matches!(zero_k, Err(SearchError::Validation(_))));

        let empty = engine.search("장미", "   ", 3).await;
        assert!(matches!(empty, Err(SearchError::Validation(_))));

        assert_eq!(embedder.call_count(), 0);
        Ok(())
    }

    #[test]
    fn mismatched_metadata_is_discarded_without_padding() {
        let document = |disease: &str, crop: &str| IndexedDocument {
            id: disease.to_string(),
            content: format!("병명: {disease}"),
            metadata: DocumentMetadata {
                disease_name: disease.to_string(),
                crop_name: crop.to_string(),
                crop_code: String::new(),
                has_ecology: false,
                has_symptoms: false,
                has_prevention: false,
                image_path: String::new(),
            },
            embedding: Vec::new(),
        };
        let rose = document("흑반병", "장미");
        let stale = document("흰녹병", "국화");
        let trailing = document("노균병", "장미 ");

        let hits = retain_crop_matches(Crop::Rose, vec![(&stale, 0.1), (&rose, 0.2), (&trailing, 0.3)]);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].disease_name, "흑반병");
        assert_eq!(hits[0].score, 0.2);
    }
}
