use crate::crops::Crop;
use crate::error::CollectError;
use crate::models::{CatalogEntry, DiseaseRecord};
use crate::text::clean_catalog_text;
use crate::traits::DiseaseCatalog;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Placeholder image the catalog serves when a disease has no photo.
pub const NO_IMAGE_URL: &str = "http://ncpms.rda.go.kr/images/common/noImg.gif";

#[derive(Debug, Clone)]
pub struct SkippedDisease {
    pub source_id: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    pub records: Vec<DiseaseRecord>,
    pub skipped: Vec<SkippedDisease>,
}

/// Pulls a crop's diseases from the catalog, best effort: catalog failures are
/// logged and the affected disease is skipped.
pub struct DiseaseCollector {
    catalog: Arc<dyn DiseaseCatalog>,
    image_dir: PathBuf,
}

impl DiseaseCollector {
    pub fn new(catalog: Arc<dyn DiseaseCatalog>, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            image_dir: image_dir.into(),
        }
    }

    pub async fn collect(&self, crop: Crop) -> CollectionReport {
        info!(crop = %crop, "collecting disease data");

        let entries = match self.catalog.list_diseases(crop).await {
            Ok(entries) => entries,
            Err(error) => {
                warn!(crop = %crop, %error, "disease list request failed");
                return CollectionReport::default();
            }
        };

        if entries.is_empty() {
            warn!(crop = %crop, "catalog has no diseases for crop");
            return CollectionReport::default();
        }
        info!(crop = %crop, diseases = entries.len(), "disease list received");

        let mut report = CollectionReport::default();
        let total = entries.len();

        for (position, entry) in entries.into_iter().enumerate() {
            debug!(crop = %crop, disease = %entry.name, "[{}/{}] fetching detail", position + 1, total);

            let detail = match self.catalog.disease_detail(&entry.source_id).await {
                Ok(Some(detail)) => detail,
                Ok(None) => {
                    report.skipped.push(skip(&entry, "catalog returned no detail".to_string()));
                    continue;
                }
                Err(error) => {
                    warn!(crop = %crop, source_id = %entry.source_id, %error, "disease detail request failed");
                    report.skipped.push(skip(&entry, error.to_string()));
                    continue;
                }
            };

            let image_path = match entry.thumbnail_url.as_deref() {
                Some(url) => self.save_image(crop, &entry.name, url).await,
                None => None,
            };

            let name = clean_catalog_text(&detail.name);
            report.records.push(DiseaseRecord {
                name: if name.is_empty() { clean_catalog_text(&entry.name) } else { name },
                ecology: clean_catalog_text(&detail.ecology),
                symptoms: clean_catalog_text(&detail.symptoms),
                prevention: clean_catalog_text(&detail.prevention),
                crop_name: crop.display_name().to_string(),
                crop_code: crop.code().to_string(),
                image_path,
                source_id: entry.source_id,
            });
        }

        info!(
            crop = %crop,
            records = report.records.len(),
            skipped = report.skipped.len(),
            "disease data collected"
        );
        report
    }

    async fn save_image(&self, crop: Crop, disease_name: &str, url: &str) -> Option<String> {
        if url.trim().is_empty() || url == NO_IMAGE_URL {
            debug!(disease = %disease_name, "no image for disease");
            return None;
        }

        match self.try_save_image(crop, disease_name, url).await {
            Ok(path) => {
                debug!(disease = %disease_name, path = %path.display(), "image saved");
                Some(path.to_string_lossy().to_string())
            }
            Err(error) => {
                warn!(disease = %disease_name, %url, %error, "image download failed");
                None
            }
        }
    }

    async fn try_save_image(&self, crop: Crop, disease_name: &str, url: &str) -> Result<PathBuf, CollectError> {
        let bytes = self.catalog.fetch_image(url).await?;
        tokio::fs::create_dir_all(&self.image_dir).await?;

        let file_name = format!(
            "{}_{}.{}",
            crop.display_name(),
            safe_file_stem(disease_name)?,
            image_extension(url)
        );
        let path = self.image_dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

fn skip(entry: &CatalogEntry, reason: String) -> SkippedDisease {
    SkippedDisease {
        source_id: entry.source_id.clone(),
        name: entry.name.clone(),
        reason,
    }
}

/// Drops non-word characters and joins dash/space runs with `_`.
pub fn safe_file_stem(name: &str) -> Result<String, CollectError> {
    let symbols = Regex::new(r"[^\w\s-]")?;
    let separators = Regex::new(r"[-\s]+")?;
    let stripped = symbols.replace_all(name, "");
    Ok(separators.replace_all(stripped.trim(), "_").to_string())
}

fn image_extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    match last_segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 4 && ext.chars().all(|ch| ch.is_ascii_alphanumeric()) => ext,
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiseaseDetail;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::tempdir;

    struct ScriptedCatalog {
        entries: Result<Vec<CatalogEntry>, String>,
    }

    #[async_trait]
    impl DiseaseCatalog for ScriptedCatalog {
        async fn list_diseases(&self, _crop: Crop) -> Result<Vec<CatalogEntry>, CollectError> {
            self.entries.clone().map_err(CollectError::CatalogResponse)
        }

        async fn disease_detail(&self, source_id: &str) -> Result<Option<DiseaseDetail>, CollectError> {
            match source_id {
                "D1" => Ok(Some(DiseaseDetail {
                    name: "흑반병".to_string(),
                    ecology: "고온<br>다습".to_string(),
                    symptoms: "잎에\r\n검은   반점".to_string(),
                    prevention: String::new(),
                })),
                "D2" => Ok(None),
                _ => Err(CollectError::CatalogResponse("timeout".to_string())),
            }
        }

        async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, CollectError> {
            if url.contains("broken") {
                Err(CollectError::CatalogResponse("404".to_string()))
            } else {
                Ok(vec![0x89, 0x50, 0x4e, 0x47])
            }
        }
    }

    fn entry(source_id: &str, name: &str, thumbnail_url: Option<&str>) -> CatalogEntry {
        CatalogEntry {
            source_id: source_id.to_string(),
            name: name.to_string(),
            thumbnail_url: thumbnail_url.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn failing_details_are_skipped_and_text_is_cleaned() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let catalog = ScriptedCatalog {
            entries: Ok(vec![
                entry("D1", "흑반병", Some("http://img.example/black-spot.jpg?v=1")),
                entry("D2", "노균병", None),
                entry("D3", "탄저병", None),
            ]),
        };
        let collector = DiseaseCollector::new(Arc::new(catalog), dir.path());

        let report = collector.collect(Crop::Rose).await;

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        let record = &report.records[0];
        assert_eq!(record.ecology, "고온 다습");
        assert_eq!(record.symptoms, "잎에 검은 반점");
        assert_eq!(record.crop_name, "장미");
        assert_eq!(record.crop_code, "FL082028");
        assert_eq!(record.source_id, "D1");

        let image = record.image_path.as_deref().ok_or("image missing")?;
        assert!(image.ends_with("장미_흑반병.jpg"));
        assert!(Path::new(image).is_file());
        Ok(())
    }

    #[tokio::test]
    async fn placeholder_and_broken_images_leave_no_path() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let catalog = ScriptedCatalog {
            entries: Ok(vec![entry("D1", "흑반병", Some(NO_IMAGE_URL))]),
        };
        let report = DiseaseCollector::new(Arc::new(catalog), dir.path())
            .collect(Crop::Rose)
            .await;
        assert_eq!(report.records[0].image_path, None);

        let catalog = ScriptedCatalog {
            entries: Ok(vec![entry("D1", "흑반병", Some("http://img.example/broken.png"))]),
        };
        let report = DiseaseCollector::new(Arc::new(catalog), dir.path())
            .collect(Crop::Rose)
            .await;
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].image_path, None);
        Ok(())
    }

    #[tokio::test]
    async fn list_failure_yields_empty_report() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let catalog = ScriptedCatalog {
            entries: Err("service down".to_string()),
        };
        let report = DiseaseCollector::new(Arc::new(catalog), dir.path())
            .collect(Crop::Peony)
            .await;
        assert!(report.records.is_empty());
        assert!(report.skipped.is_empty());
        Ok(())
    }

    #[test]
    fn file_stems_are_sanitized() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(safe_file_stem("잿빛곰팡이병(회색)")?, "잿빛곰팡이병회색");
        assert_eq!(safe_file_stem(" 검은 - 무늬 병 ")?, "검은_무늬_병");
        Ok(())
    }

    #[test]
    fn image_extension_falls_back_to_png() {
        assert_eq!(image_extension("http://x/a/b.JPG"), "JPG");
        assert_eq!(image_extension("http://x/a/b.jpeg?size=1"), "jpeg");
        assert_eq!(image_extension("http://x/a/image"), "png");
        assert_eq!(image_extension("http://x.kr/a/image"), "png");
    }
}
