use crate::crops::Crop;
use crate::error::CollectError;
use crate::models::{CatalogEntry, DiseaseDetail};
use crate::traits::DiseaseCatalog;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, NoneAsEmptyString};
use std::time::Duration;
use url::Url;

pub const DEFAULT_NCPMS_URL: &str = "http://ncpms.rda.go.kr/npmsAPI/service";

/// Client for the national crop pest management (NCPMS) open API.
pub struct NcpmsCatalog {
    endpoint: String,
    api_key: String,
    client: Client,
    image_client: Client,
}

impl NcpmsCatalog {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, CollectError> {
        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: Client::builder().timeout(timeout).build()?,
            image_client: Client::builder().timeout(timeout * 2).build()?,
        })
    }

    fn service_url(&self, params: &[(&str, &str)]) -> Result<Url, CollectError> {
        let mut all = vec![("apiKey", self.api_key.as_str())];
        all.extend_from_slice(params);
        Ok(Url::parse_with_params(&self.endpoint, &all)?)
    }

    async fn get_json(&self, url: Url) -> Result<Value, CollectError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DiseaseCatalog for NcpmsCatalog {
    async fn list_diseases(&self, crop: Crop) -> Result<Vec<CatalogEntry>, CollectError> {
        let url = self.service_url(&[
            ("serviceCode", "SVC01"),
            ("serviceType", "AA003"),
            ("cropName", crop.display_name()),
        ])?;
        parse_disease_list(self.get_json(url).await?)
    }

    async fn disease_detail(&self, source_id: &str) -> Result<Option<DiseaseDetail>, CollectError> {
        let url = self.service_url(&[("serviceCode", "SVC05"), ("sickKey", source_id)])?;
        parse_disease_detail(self.get_json(url).await?)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, CollectError> {
        let response = self.image_client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct ListItem {
    #[serde(rename = "sickKey", default)]
    sick_key: Value,
    #[serde(rename = "sickNameKor", default)]
    sick_name_kor: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(rename = "thumbImg", default)]
    thumb_img: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailBody {
    #[serde(rename = "sickNameKor", default)]
    sick_name_kor: Option<String>,
    #[serde(rename = "developmentCondition", default)]
    development_condition: Option<String>,
    #[serde(default)]
    symptoms: Option<String>,
    #[serde(rename = "preventionMethod", default)]
    prevention_method: Option<String>,
}

fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Reads `service.list[]`. A missing list means the crop has no entries.
pub(crate) fn parse_disease_list(body: Value) -> Result<Vec<CatalogEntry>, CollectError> {
    let Some(list) = body.pointer("/service/list").cloned() else {
        return Ok(Vec::new());
    };

    let items: Vec<ListItem> = serde_json::from_value(list)
        .map_err(|error| CollectError::CatalogResponse(error.to_string()))?;

    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let source_id = key_string(&item.sick_key)?;
            Some(CatalogEntry {
                name: item
                    .sick_name_kor
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| format!("병{}", position + 1)),
                source_id,
                thumbnail_url: item.thumb_img,
            })
        })
        .collect())
}

pub(crate) fn parse_disease_detail(body: Value) -> Result<Option<DiseaseDetail>, CollectError> {
    let Some(service) = body.get("service").cloned() else {
        return Ok(None);
    };

    let detail: DetailBody = serde_json::from_value(service)
        .map_err(|error| CollectError::CatalogResponse(error.to_string()))?;

    Ok(Some(DiseaseDetail {
        name: detail.sick_name_kor.unwrap_or_default(),
        ecology: detail.development_condition.unwrap_or_default(),
        symptoms: detail.symptoms.unwrap_or_default(),
        prevention: detail.prevention_method.unwrap_or_default(),
    }))
}
