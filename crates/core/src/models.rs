use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder written into a composed document for an empty field.
pub const MISSING_FIELD_TEXT: &str = "정보 없음";

/// A row of the catalog's per-crop disease list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub source_id: String,
    pub name: String,
    pub thumbnail_url: Option<String>,
}

/// Raw detail fields for one disease, before cleaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiseaseDetail {
    pub name: String,
    pub ecology: String,
    pub symptoms: String,
    pub prevention: String,
}

/// One disease as delivered by the collector. Text fields are already cleaned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiseaseRecord {
    pub name: String,
    pub ecology: String,
    pub symptoms: String,
    pub prevention: String,
    pub crop_name: String,
    pub crop_code: String,
    pub image_path: Option<String>,
    pub source_id: String,
}

impl DiseaseRecord {
    /// Labeled multi-field text that gets embedded: name, ecology, symptoms, prevention.
    pub fn compose_content(&self) -> String {
        format!(
            "병명: {}\n\n발생생태:\n{}\n\n병 증상:\n{}\n\n방제방법:\n{}",
            self.name,
            or_missing(&self.ecology),
            or_missing(&self.symptoms),
            or_missing(&self.prevention),
        )
    }
}

fn or_missing(value: &str) -> &str {
    if value.trim().is_empty() {
        MISSING_FIELD_TEXT
    } else {
        value
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub disease_name: String,
    pub crop_name: String,
    pub crop_code: String,
    pub has_ecology: bool,
    pub has_symptoms: bool,
    pub has_prevention: bool,
    #[serde(default)]
    pub image_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
    pub embedding: Vec<f32>,
}

/// On-disk form of a crop index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub collection: String,
    pub crop_name: String,
    pub crop_code: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub built_at: DateTime<Utc>,
    pub documents: Vec<IndexedDocument>,
}

/// A ranked diagnosis candidate. `score` is the cosine distance to the query,
/// so smaller is closer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub disease_name: String,
    pub score: f32,
    pub content: String,
    pub image_path: String,
}

/// Equality filter over document metadata. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub crop_name: Option<String>,
    pub disease_name: Option<String>,
}

impl MetadataFilter {
    pub fn crop(crop_name: impl Into<String>) -> Self {
        Self {
            crop_name: Some(crop_name.into()),
            disease_name: None,
        }
    }

    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        self.crop_name
            .as_deref()
            .map_or(true, |crop| metadata.crop_name == crop)
            && self
                .disease_name
                .as_deref()
                .map_or(true, |name| metadata.disease_name == name)
    }
}

/// Lifecycle of a crop index as seen from the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    Unindexed,
    Building,
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnosis {
    /// The crop's index is not ready yet; retry once it is.
    Preparing,
    Ready {
        processed_query: String,
        hits: Vec<SearchHit>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailAnswer {
    Explained { disease: String, text: String },
    NotFound { disease: String, message: String },
}

impl DetailAnswer {
    pub fn not_found(disease: &str) -> Self {
        Self::NotFound {
            disease: disease.to_string(),
            message: format!("'{disease}' 정보를 찾을 수 없습니다. 작물이 올바른지 확인해주세요."),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Explained { text, .. } => text,
            Self::NotFound { message, .. } => message,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Explained { .. })
    }
}
