//! Single-shot retrieval question answering.
//!
//! Retrieves the top chunks for a question, packs them into the QA template
//! and asks the model once, with no tools on offer.

use std::sync::Arc;

use tracing::info;

use docent_core::types::{scalar_to_text, Message, RetrievalResult};
use docent_vector::retriever::Retriever;

use crate::error::AgentError;
use crate::llm::LanguageModel;
use crate::prompt::{render_qa, QA_TEMPLATE};

/// Answer plus the sources it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

pub struct RagChain {
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
    template: String,
}

impl RagChain {
    pub fn new(retriever: Retriever, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            retriever,
            model,
            template: QA_TEMPLATE.to_string(),
        }
    }

    /// Use a custom template with `{context}` and `{question}` slots.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn answer(&self, question: &str) -> Result<RagAnswer, AgentError> {
        if question.trim().is_empty() {
            return Err(AgentError::EmptyMessage);
        }
        if self.retriever.status().total_chunks == 0 {
            return Err(AgentError::NotReady(format!(
                "no documents indexed in collection '{}'",
                self.retriever.collection()
            )));
        }

        let result = self.retriever.query(question).await?;
        let prompt = render_qa(&self.template, &context_blocks(&result), question);
        let response = self.model.complete(&[Message::user(prompt)], &[]).await?;

        info!(
            collection = self.retriever.collection(),
            chunks = result.len(),
            "Question answered"
        );
        Ok(RagAnswer {
            answer: response.text_or_empty().to_string(),
            sources: Retriever::citations(&result),
        })
    }
}

/// `[Source {i}: {source}, Page {page}]` blocks separated by blank lines.
pub fn context_blocks(result: &RetrievalResult) -> String {
    result
        .iter()
        .map(|hit| {
            let page = hit
                .chunk
                .metadata
                .get("page")
                .map(scalar_to_text)
                .unwrap_or_else(|| "N/A".to_string());
            format!(
                "[Source {}: {}, Page {}]\n{}",
                hit.rank, hit.chunk.source_id, page, hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use docent_core::types::{AssistantMessage, Chunk, Metadata};
    use docent_core::SourceDocument;
    use docent_vector::index::VectorIndex;
    use docent_vector::HashEmbedding;

    fn retriever() -> Retriever {
        Retriever::new(VectorIndex::new(), HashEmbedding::new(64).unwrap(), "portfolio")
            .unwrap()
            .with_k(2)
    }

    #[tokio::test]
    async fn test_not_ready_without_documents() {
        let model = Arc::new(ScriptedModel::new(vec![AssistantMessage::answer("unused")]));
        let chain = RagChain::new(retriever(), model.clone());
        let err = chain.answer("What projects?").await.unwrap_err();
        assert!(matches!(err, AgentError::NotReady(_)));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_with_sources() {
        let retriever = retriever();
        retriever
            .reindex(&[
                SourceDocument::new("resume.pdf", "Built a Rust search engine for legal documents.")
                    .with_metadata("page", 1),
                SourceDocument::new("hobbies.txt", "Enjoys climbing and chess."),
            ])
            .await
            .unwrap();

        let model = Arc::new(ScriptedModel::new(vec![AssistantMessage::answer(
            "A Rust search engine.",
        )]));
        let chain = RagChain::new(retriever, model.clone());
        let answer = chain.answer("Which search engine projects?").await.unwrap();

        assert_eq!(answer.answer, "A Rust search engine.");
        assert_eq!(answer.sources.len(), 2);
        assert!(answer.sources[0].starts_with("resume.pdf, page 1: "));

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        let Message::User { text } = &calls[0][0] else {
            panic!("expected a single user prompt");
        };
        assert!(text.contains("[Source 1: resume.pdf, Page 1]\nBuilt a Rust search engine"));
        assert!(text.contains("[Source 2: hobbies.txt, Page N/A]"));
        assert!(text.contains("QUESTION: Which search engine projects?"));
    }

    #[test]
    fn test_context_blocks_layout() {
        let mut metadata = Metadata::new();
        metadata.insert("page".to_string(), 3.into());
        let result = RetrievalResult::from_ranked(vec![
            (Chunk::new("alpha", "a.pdf", metadata), 0.9),
            (Chunk::new("beta", "b.txt", Metadata::new()), 0.5),
        ]);
        assert_eq!(
            context_blocks(&result),
            "[Source 1: a.pdf, Page 3]\nalpha\n\n[Source 2: b.txt, Page N/A]\nbeta"
        );
    }
}
