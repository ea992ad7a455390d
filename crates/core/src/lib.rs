pub mod backends;
pub mod collector;
pub mod config;
pub mod crops;
pub mod detail;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod search;
pub mod service;
pub mod store;
pub mod text;
pub mod traits;

pub use backends::{NcpmsCatalog, OpenAiChatGenerator, OpenAiEmbedder};
pub use collector::{CollectionReport, DiseaseCollector, SkippedDisease};
pub use config::DoctorConfig;
pub use crops::Crop;
pub use detail::DetailAnswerEngine;
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{CollectError, SearchError};
pub use models::{
    CatalogEntry, DetailAnswer, Diagnosis, DiseaseDetail, DiseaseRecord, DocumentMetadata,
    IndexManifest, IndexState, IndexedDocument, MetadataFilter, SearchHit,
};
pub use search::{SimilaritySearchEngine, DEFAULT_TOP_K};
pub use service::PlantDoctor;
pub use store::{CropIndex, CropIndexStore};
pub use text::{clean_catalog_text, normalize_query};
pub use traits::{DiseaseCatalog, TextGenerator};
