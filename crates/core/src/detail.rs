use crate::crops::Crop;
use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::DetailAnswer;
use crate::store::CropIndexStore;
use crate::traits::TextGenerator;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_DETAIL_CANDIDATES: usize = 10;

const SYSTEM_PROMPT: &str = "당신은 친절하고 전문적인 농업 병해 상담 어시스턴트입니다.
주어진 컨텍스트 내 정보만을 사용하여 한국어로 간결하고 이해하기 쉽게 답변하세요.

답변은 아래 형식을 따릅니다:
① [발생 원인] 해당 병이 생기는 주요 원인이나 조건을 설명합니다.
② [주요 증상] 농작물에서 관찰되는 대표적인 증상을 요약합니다.
③ [방제 방법] 예방 및 대응에 도움이 되는 구체적인 방제 또는 관리 방법을 제시합니다.

가능하면 부드럽고 조언하는 말투로 작성하세요.
컨텍스트에 없는 사실은 추가하지 마세요. 컨텍스트에 정보가 없거나 불확실한 항목에는 반드시 '데이터 없음'이라고 표시하세요.";

/// Explains one disease using only its indexed document as context.
pub struct DetailAnswerEngine {
    store: Arc<CropIndexStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn TextGenerator>,
    candidates: usize,
}

impl DetailAnswerEngine {
    pub fn new(
        store: Arc<CropIndexStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            candidates: DEFAULT_DETAIL_CANDIDATES,
        }
    }

    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates.max(1);
        self
    }

    /// Fails with [`SearchError::IndexNotFound`] when the crop has no index;
    /// a disease missing from the index is a [`DetailAnswer::NotFound`].
    pub async fn explain(&self, crop: &str, disease_name: &str) -> Result<DetailAnswer, SearchError> {
        let crop = Crop::resolve(crop)?;
        if disease_name.trim().is_empty() {
            return Err(SearchError::Validation("disease name is empty".to_string()));
        }

        let index = self.store.load_for(crop).await?;
        let query_vector = self.embedder.embed_one(&format!("병명: {disease_name}")).await?;

        // The loose search has no exact-match primitive; the exact name and
        // crop check happens on the candidates.
        let context = index
            .similarity_search_with_score(&query_vector, self.candidates, None)
            .into_iter()
            .map(|(document, _)| document)
            .find(|document| {
                document.metadata.disease_name == disease_name
                    && document.metadata.crop_name == crop.display_name()
            })
            .map(|document| document.content.clone());

        let Some(context) = context else {
            info!(crop = %crop, disease = %disease_name, "no indexed document for disease");
            return Ok(DetailAnswer::not_found(disease_name));
        };

        debug!(crop = %crop, disease = %disease_name, context_chars = context.chars().count(), "detail context loaded");

        let text = self
            .generator
            .generate(SYSTEM_PROMPT, &user_prompt(&context, disease_name))
            .await?;

        Ok(DetailAnswer::Explained {
            disease: disease_name.to_string(),
            text,
        })
    }
}

fn user_prompt(context: &str, disease_name: &str) -> String {
    format!(
        "[컨텍스트]\n{context}\n\n질문: '{disease_name}'에 대해 발생 원인, 주요 증상, 방제 방법을 항목별로 간결하게 정리해줘."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{record, KeywordEmbedder};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Returns the user prompt so tests can see exactly which context was sent.
    #[derive(Default)]
    struct EchoGenerator {
        prompts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, SearchError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push((system_prompt.to_string(), user_prompt.to_string()));
            }
            Ok(user_prompt.to_string())
        }
    }

    fn setup(root: &std::path::Path) -> (DetailAnswerEngine, Arc<CropIndexStore>, Arc<EchoGenerator>, Arc<KeywordEmbedder>) {
        let embedder = Arc::new(KeywordEmbedder::new());
        let generator = Arc::new(EchoGenerator::default());
        let store = Arc::new(CropIndexStore::new(root, embedder.clone()));
        let engine = DetailAnswerEngine::new(store.clone(), embedder.clone(), generator.clone());
        (engine, store, generator, embedder)
    }

    #[tokio::test]
    async fn answer_is_grounded_in_the_exact_disease() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (engine, store, generator, embedder) = setup(dir.path());
        let index = store
            .build(
                "장미",
                &[
                    record(Crop::Rose, "흰가루병", "탄저 탄저 탄저"),
                    record(Crop::Rose, "탄저병", "잎 잎 반점 흰 가루"),
                ],
            )
            .await?;

        // The neighbour outranks the requested disease in the loose search.
        let query = embedder.embed_one("병명: 탄저병").await?;
        let loose = index.similarity_search_with_score(&query, DEFAULT_DETAIL_CANDIDATES, None);
        assert_eq!(loose[0].0.metadata.disease_name, "흰가루병");

        let answer = engine.explain("장미", "탄저병").await?;

        assert!(answer.is_found());
        assert!(answer.text().contains("병명: 탄저병"));
        assert!(answer.text().contains("잎 잎 반점 흰 가루"));
        assert!(!answer.text().contains("흰가루병"));

        let prompts = generator.prompts.lock().map_err(|_| "poisoned")?;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].0.contains("데이터 없음"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_disease_degrades_to_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (engine, store, generator, _) = setup(dir.path());
        store
            .build("장미", &[record(Crop::Rose, "탄저병", "잎에 갈색 병반")])
            .await?;

        let answer = engine.explain("장미", "없는병").await?;

        assert_eq!(answer, DetailAnswer::not_found("없는병"));
        assert!(generator.prompts.lock().map_err(|_| "poisoned")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn name_match_is_case_and_space_sensitive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (engine, store, _, _) = setup(dir.path());
        store
            .build("카네이션", &[record(Crop::Carnation, "Fusarium 시들음병", "시들")])
            .await?;

        assert!(!engine.explain("카네이션", "fusarium 시들음병").await?.is_found());
        assert!(!engine.explain("카네이션", "Fusarium  시들음병").await?.is_found());
        assert!(engine.explain("카네이션", "Fusarium 시들음병").await?.is_found());
        Ok(())
    }

    #[tokio::test]
    async fn missing_index_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let (engine, _, _, embedder) = setup(dir.path());

        let missing = engine.explain("작약", "탄저병").await;
        assert!(matches!(missing, Err(SearchError::IndexNotFound { .. })));

        let unsupported = engine.explain("존재하지않는작물", "탄저병").await;
        assert!(matches!(unsupported, Err(SearchError::UnsupportedCrop { .. })));
        assert_eq!(embedder.call_count(), 0);
        Ok(())
    }
}
