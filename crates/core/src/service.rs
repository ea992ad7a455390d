use crate::collector::DiseaseCollector;
use crate::config::DoctorConfig;
use crate::crops::Crop;
use crate::detail::DetailAnswerEngine;
use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{DetailAnswer, Diagnosis, IndexState};
use crate::search::SimilaritySearchEngine;
use crate::store::CropIndexStore;
use crate::text::normalize_query;
use crate::traits::{DiseaseCatalog, TextGenerator};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

type InFlightSet = Arc<Mutex<HashSet<Crop>>>;

/// Application-facing entry point: owns the backends and tracks which crops
/// are being indexed so at most one build per crop runs at a time.
pub struct PlantDoctor {
    collector: Arc<DiseaseCollector>,
    store: Arc<CropIndexStore>,
    search: SimilaritySearchEngine,
    detail: DetailAnswerEngine,
    in_flight: InFlightSet,
    default_top_k: usize,
}

impl PlantDoctor {
    pub fn new(
        config: &DoctorConfig,
        catalog: Arc<dyn DiseaseCatalog>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, SearchError> {
        config.validate()?;

        let store = Arc::new(CropIndexStore::new(&config.index_dir, embedder.clone()));
        Ok(Self {
            collector: Arc::new(DiseaseCollector::new(catalog, &config.image_dir)),
            search: SimilaritySearchEngine::new(store.clone(), embedder.clone()),
            detail: DetailAnswerEngine::new(store.clone(), embedder, generator)
                .with_candidates(config.detail_candidates),
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            default_top_k: config.default_top_k,
        })
    }

    pub fn state(&self, crop: &str) -> Result<IndexState, SearchError> {
        let crop = Crop::resolve(crop)?;
        Ok(self.state_for(crop))
    }

    fn state_for(&self, crop: Crop) -> IndexState {
        if self.store.exists_for(crop) {
            IndexState::Ready
        } else if lock(&self.in_flight).contains(&crop) {
            IndexState::Building
        } else {
            IndexState::Unindexed
        }
    }

    /// Collects and indexes `crop` in the foreground; returns the number of
    /// indexed documents.
    pub async fn index_crop(&self, crop: &str) -> Result<usize, SearchError> {
        let crop = Crop::resolve(crop)?;
        let guard = InFlight::acquire(&self.in_flight, crop).ok_or_else(|| {
            SearchError::Validation(format!("an index build for {crop} is already running"))
        })?;

        let indexed = build_crop_index(&self.collector, &self.store, crop).await;
        drop(guard);
        indexed
    }

    /// Starts a background build unless the index exists or one is running.
    pub fn prepare(&self, crop: &str) -> Result<IndexState, SearchError> {
        let crop = Crop::resolve(crop)?;
        Ok(self.prepare_for(crop))
    }

    fn prepare_for(&self, crop: Crop) -> IndexState {
        if self.store.exists_for(crop) {
            return IndexState::Ready;
        }

        let Some(guard) = InFlight::acquire(&self.in_flight, crop) else {
            return IndexState::Building;
        };
        self.spawn_build(guard)
    }

    fn spawn_build(&self, guard: InFlight) -> IndexState {
        let crop = guard.crop;
        // Another build may have published between the existence check and the acquire.
        if self.store.exists_for(crop) {
            return IndexState::Ready;
        }

        let collector = self.collector.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let _guard = guard;
            match build_crop_index(&collector, &store, crop).await {
                Ok(documents) => info!(crop = %crop, documents, "background index build finished"),
                Err(error) => warn!(crop = %crop, %error, "background index build failed"),
            }
        });

        info!(crop = %crop, "background index build started");
        IndexState::Building
    }

    /// Normalizes the symptom text and searches once the crop is indexed.
    /// Before that, kicks off a build and reports [`Diagnosis::Preparing`].
    pub async fn diagnose(
        &self,
        crop: &str,
        symptoms: &str,
        top_k: Option<usize>,
    ) -> Result<Diagnosis, SearchError> {
        let crop = Crop::resolve(crop)?;
        let processed_query = normalize_query(symptoms);
        info!(crop = %crop, raw = %symptoms, processed = %processed_query, "diagnosis requested");

        if processed_query.is_empty() {
            return Err(SearchError::Validation(
                "symptom description has no searchable words".to_string(),
            ));
        }

        if self.prepare_for(crop) != IndexState::Ready {
            return Ok(Diagnosis::Preparing);
        }

        let hits = self
            .search
            .search(
                crop.display_name(),
                &processed_query,
                top_k.unwrap_or(self.default_top_k),
            )
            .await?;

        Ok(Diagnosis::Ready {
            processed_query,
            hits,
        })
    }

    pub async fn explain(&self, crop: &str, disease_name: &str) -> Result<DetailAnswer, SearchError> {
        self.detail.explain(crop, disease_name).await
    }
}

async fn build_crop_index(
    collector: &DiseaseCollector,
    store: &CropIndexStore,
    crop: Crop,
) -> Result<usize, SearchError> {
    let report = collector.collect(crop).await;
    for skipped in &report.skipped {
        warn!(crop = %crop, source_id = %skipped.source_id, disease = %skipped.name, reason = %skipped.reason, "skipped disease");
    }

    let index = store.build_for(crop, &report.records).await?;
    Ok(index.len())
}

fn lock(set: &Mutex<HashSet<Crop>>) -> std::sync::MutexGuard<'_, HashSet<Crop>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-crop build marker, released on drop.
struct InFlight {
    crop: Crop,
    crops: InFlightSet,
}

impl InFlight {
    fn acquire(crops: &InFlightSet, crop: Crop) -> Option<Self> {
        if !lock(crops).insert(crop) {
            return None;
        }
        Some(Self {
            crop,
            crops: crops.clone(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.crops).remove(&self.crop);
    }
}
