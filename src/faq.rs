//! FAQ answering over retrieved context
//!
//! Retrieval is an opaque collaborator behind `ContextRetriever`. The
//! default implementation chunks a plain-text FAQ document and ranks
//! chunks by term overlap with the question.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::AssessorError;
use crate::llm::ChatModel;
use crate::Result;

/// Deterministic fallback when the FAQ has nothing relevant.
pub const FAQ_FALLBACK: &str = "Não encontrei essa informação no FAQ.";

/// Chunks returned per question.
const TOP_K: usize = 6;

const FAQ_SYSTEM_PROMPT: &str = r#"### PAPEL
Você responde dúvidas SOMENTE com base no documento normativo oficial (trechos fornecidos em CONTEXTO).
Se a informação solicitada não constar no documento, diga exatamente: "Não encontrei essa informação no FAQ."

### REGRAS
- Seja breve, claro e educado.
- Fale em linguagem simples, sem jargões técnicos ou referências a código/infra.
- Quando fizer sentido, mencione a parte relevante (ex.: "Seção 6.2.1") se estiver explícita no trecho.
- Não prometa funcionalidades futuras.
"#;

/// Given a question, returns concatenated relevant text chunks.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, question: &str) -> Result<String>;
}

/// File-backed retriever: paragraph chunks ranked by case-insensitive term
/// overlap with the question, top-k joined with blank lines.
pub struct FileFaqRetriever {
    chunks: Vec<String>,
}

impl FileFaqRetriever {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(&path).map_err(|e| {
            AssessorError::RetrievalError(format!(
                "failed to read FAQ document {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self::from_text(&text))
    }

    pub fn from_text(text: &str) -> Self {
        let chunks = text
            .split("\n\n")
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(str::to_string)
            .collect();
        Self { chunks }
    }

    fn score(chunk: &str, question: &str) -> usize {
        let chunk = chunk.to_lowercase();
        question
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|term| term.len() > 2)
            .filter(|term| chunk.contains(term))
            .count()
    }
}

#[async_trait]
impl ContextRetriever for FileFaqRetriever {
    async fn retrieve(&self, question: &str) -> Result<String> {
        let mut ranked: Vec<(usize, &String)> = self
            .chunks
            .iter()
            .map(|chunk| (Self::score(chunk, question), chunk))
            .filter(|(score, _)| *score > 0)
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let context = ranked
            .iter()
            .take(TOP_K)
            .map(|(_, chunk)| chunk.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        debug!(chunks = ranked.len().min(TOP_K), "FAQ context retrieved");
        Ok(context)
    }
}

pub struct FaqAgent {
    retriever: Arc<dyn ContextRetriever>,
    model: Arc<dyn ChatModel>,
}

impl FaqAgent {
    pub fn new(retriever: Arc<dyn ContextRetriever>, model: Arc<dyn ChatModel>) -> Self {
        Self { retriever, model }
    }

    /// Answer constrained to the retrieved context. Empty retrieval short-
    /// circuits to the fallback without a model call.
    pub async fn answer(&self, question: &str) -> Result<String> {
        let context = self.retriever.retrieve(question).await?;

        if context.trim().is_empty() {
            info!("FAQ retrieval returned no context");
            return Ok(FAQ_FALLBACK.to_string());
        }

        let input = format!(
            "Pergunta do usuário:\n{}\n\nCONTEXTO (trechos do documento):\n{}\n\nResponda com base APENAS no CONTEXTO.",
            question, context
        );

        self.model.complete(FAQ_SYSTEM_PROMPT, &[], &input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;

    struct EmptyRetriever;

    #[async_trait]
    impl ContextRetriever for EmptyRetriever {
        async fn retrieve(&self, _question: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    const FAQ_TEXT: &str = "O suporte atende pelo e-mail suporte@assessor.ai em dias úteis.\n\nLançamentos não podem ser excluídos, apenas atualizados (Seção 6.2.1).\n\nSeus dados são tratados conforme a LGPD.";

    #[tokio::test]
    async fn test_empty_context_returns_exact_fallback_without_model_call() {
        // Scripted model with no responses: any call would error.
        let agent = FaqAgent::new(
            Arc::new(EmptyRetriever),
            Arc::new(ScriptedModel::new(Vec::<String>::new())),
        );

        let answer = agent.answer("Qual e-mail de suporte?").await.unwrap();
        assert_eq!(answer, FAQ_FALLBACK);
    }

    #[tokio::test]
    async fn test_retrieved_context_is_passed_to_model() {
        let retriever = Arc::new(FileFaqRetriever::from_text(FAQ_TEXT));
        let model = Arc::new(ScriptedModel::new([
            "O suporte atende pelo e-mail suporte@assessor.ai.",
        ]));
        let agent = FaqAgent::new(retriever, model.clone());

        let answer = agent.answer("Qual o e-mail de suporte?").await.unwrap();
        assert!(answer.contains("suporte@assessor.ai"));

        let inputs = model.seen_inputs.lock().unwrap();
        assert!(inputs[0].contains("CONTEXTO"));
        assert!(inputs[0].contains("suporte@assessor.ai"));
    }

    #[tokio::test]
    async fn test_retriever_ranks_relevant_chunk_first() {
        let retriever = FileFaqRetriever::from_text(FAQ_TEXT);
        let context = retriever
            .retrieve("posso excluir um lançamento antigo?")
            .await
            .unwrap();
        assert!(context.contains("não podem ser excluídos"));
        assert!(!context.contains("LGPD"));
    }

    #[tokio::test]
    async fn test_unrelated_question_yields_empty_context() {
        let retriever = FileFaqRetriever::from_text(FAQ_TEXT);
        let context = retriever.retrieve("xyz").await.unwrap();
        assert!(context.is_empty());
    }
}
