//! Top-level dispatch loop and response rendering
//!
//! The orchestrator owns the routing decision, hands routed turns to the
//! matching specialist and renders the validated result. Rendering is a
//! pure formatting stage: it never fabricates data and never rewords the
//! specialist's reply.

use tracing::{error, info};

use crate::faq::FaqAgent;
use crate::models::{Route, RouterOutput, SpecialistResult};
use crate::router::Router;
use crate::session::{SessionStore, Turn};
use crate::specialist::SpecialistAgent;
use crate::Result;

/// Render a specialist result into the fixed user-facing format.
///
/// Line 1 is `reply` verbatim. The recommendation section appears iff the
/// recommendation is non-empty. The follow-up section uses the clarifying
/// question when present, else the follow-up note, else is omitted; the two
/// are never rendered together.
pub fn render(result: &SpecialistResult) -> String {
    let mut out = result.reply.clone();

    let recommendation = result.recommendation.trim();
    if !recommendation.is_empty() {
        out.push_str("\n- *Recomendação*:\n");
        out.push_str(recommendation);
    }

    let followup = result
        .clarify_question
        .as_deref()
        .or(result.followup.as_deref());
    if let Some(followup) = followup {
        out.push_str("\n- *Acompanhamento*:\n");
        out.push_str(followup);
    }

    out
}

pub struct Orchestrator {
    router: Router,
    finance: SpecialistAgent,
    agenda: SpecialistAgent,
    faq: FaqAgent,
    sessions: SessionStore,
}

impl Orchestrator {
    pub fn new(
        router: Router,
        finance: SpecialistAgent,
        agenda: SpecialistAgent,
        faq: FaqAgent,
        sessions: SessionStore,
    ) -> Self {
        Self {
            router,
            finance,
            agenda,
            faq,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Process one user turn. Any failure in the chain is caught here and
    /// surfaced as a visible error line; the caller's loop continues.
    pub async fn dispatch(&self, utterance: &str, session_id: &str) -> String {
        match self.dispatch_turn(utterance, session_id).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(session_id, error = %e, "Turn failed");
                format!("Erro ao processar a mensagem: {}", e)
            }
        }
    }

    async fn dispatch_turn(&self, utterance: &str, session_id: &str) -> Result<String> {
        let history = self.sessions.history(session_id).await;
        self.sessions.append(session_id, Turn::user(utterance)).await;

        let reply = match self.router.classify(utterance, &history).await? {
            RouterOutput::PlainReply(text) => text,
            RouterOutput::Handoff(handoff) => {
                info!(session_id, route = %handoff.route, "Dispatching to specialist");
                match handoff.route {
                    Route::Faq => self.faq.answer(&handoff.original_question).await?,
                    Route::Financeiro => render(&self.finance.handle(&handoff, &history).await?),
                    Route::Agenda => render(&self.agenda.handle(&handoff, &history).await?),
                }
            }
        };

        self.sessions
            .append(session_id, Turn::assistant(&reply))
            .await;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faq::{FaqAgent, FileFaqRetriever, FAQ_FALLBACK};
    use crate::llm::ScriptedModel;
    use crate::models::{Domain, FinanceIntent, Intent};
    use crate::router::PERSONA_BLOCK;
    use crate::tools::store::InMemoryTransactionStore;
    use crate::tools::create_transaction_registry;
    use std::sync::Arc;

    fn result_with(reply: &str, recommendation: &str) -> SpecialistResult {
        SpecialistResult {
            domain: Domain::Financeiro,
            intent: Intent::Financeiro(FinanceIntent::Consultar),
            reply: reply.to_string(),
            recommendation: recommendation.to_string(),
            followup: None,
            clarify_question: None,
            time_window: None,
            event: None,
            write_op: None,
            metrics: None,
        }
    }

    #[test]
    fn test_render_without_recommendation_is_reply_only() {
        let rendered = render(&result_with("X", ""));
        assert_eq!(rendered, "X");
    }

    #[test]
    fn test_render_with_recommendation_and_clarify() {
        let mut result = result_with("X", "Y");
        result.clarify_question = Some("Z".to_string());
        result.followup = Some("nunca renderizado".to_string());

        let rendered = render(&result);
        assert_eq!(rendered, "X\n- *Recomendação*:\nY\n- *Acompanhamento*:\nZ");
        assert!(!rendered.contains("nunca renderizado"));
    }

    #[test]
    fn test_render_falls_back_to_followup() {
        let mut result = result_with("X", "");
        result.followup = Some("Posso detalhar por categoria.".to_string());
        assert_eq!(
            render(&result),
            "X\n- *Acompanhamento*:\nPosso detalhar por categoria."
        );
    }

    fn orchestrator(
        router_responses: Vec<String>,
        finance_responses: Vec<String>,
    ) -> Orchestrator {
        let registry = Arc::new(create_transaction_registry(Arc::new(
            InMemoryTransactionStore::new(),
        )));
        Orchestrator::new(
            Router::new(Arc::new(ScriptedModel::new(router_responses))),
            SpecialistAgent::finance(
                Arc::new(ScriptedModel::new(finance_responses)),
                registry.clone(),
            ),
            SpecialistAgent::agenda(
                Arc::new(ScriptedModel::new(Vec::<String>::new())),
                registry,
            ),
            FaqAgent::new(
                Arc::new(FileFaqRetriever::from_text("")),
                Arc::new(ScriptedModel::new(Vec::<String>::new())),
            ),
            SessionStore::new(),
        )
    }

    #[tokio::test]
    async fn test_greeting_never_reaches_a_specialist() {
        let reply = "Olá! Posso te ajudar com finanças ou agenda; por onde quer começar?";
        // Specialist models have no scripted responses: any call would fail.
        let orchestrator = orchestrator(vec![reply.to_string()], vec![]);

        let answer = orchestrator.dispatch("oi", "s1").await;
        assert_eq!(answer, reply);

        let history = orchestrator.sessions().history("s1").await;
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_finance_turn_end_to_end() {
        let handoff = format!(
            "ROUTE=financeiro\nPERGUNTA_ORIGINAL=Quanto gastei com mercado no mês passado?\nPERSONA={}\nCLARIFY=",
            PERSONA_BLOCK
        );
        let final_json = r#"{"dominio":"financeiro","intencao":"consultar","resposta":"Você gastou R$ 842,75 com 'comida' no mês passado.","recomendacao":"Quer detalhar por estabelecimento?"}"#;
        let orchestrator = orchestrator(vec![handoff], vec![final_json.to_string()]);

        let answer = orchestrator
            .dispatch("Quanto gastei com mercado no mês passado?", "s1")
            .await;

        assert_eq!(
            answer,
            "Você gastou R$ 842,75 com 'comida' no mês passado.\n- *Recomendação*:\nQuer detalhar por estabelecimento?"
        );
        assert!(!answer.contains("Acompanhamento"));
    }

    #[tokio::test]
    async fn test_faq_route_uses_fallback_on_empty_context() {
        let handoff =
            "ROUTE=faq\nPERGUNTA_ORIGINAL=Qual e-mail de suporte?\nPERSONA=\nCLARIFY=";
        let orchestrator = orchestrator(vec![handoff.to_string()], vec![]);

        let answer = orchestrator.dispatch("Qual e-mail de suporte?", "s1").await;
        assert_eq!(answer, FAQ_FALLBACK);
    }

    #[tokio::test]
    async fn test_failed_turn_surfaces_error_line_and_loop_survives() {
        let orchestrator = orchestrator(vec!["tudo certo".to_string()], vec![]);

        let first = orchestrator.dispatch("oi", "s1").await;
        assert_eq!(first, "tudo certo");

        // Router model is now exhausted: the turn fails, visibly.
        let second = orchestrator.dispatch("oi de novo", "s1").await;
        assert!(second.starts_with("Erro ao processar a mensagem"));
    }

    #[tokio::test]
    async fn test_contract_violation_becomes_degraded_reply() {
        let handoff = "ROUTE=financeiro\nPERGUNTA_ORIGINAL=saldo?\nPERSONA=\nCLARIFY=";
        let orchestrator = orchestrator(
            vec![handoff.to_string()],
            vec!["não vou responder em JSON".to_string()],
        );

        let answer = orchestrator.dispatch("saldo?", "s1").await;
        assert!(answer.starts_with("Erro ao processar a mensagem"));
        assert!(answer.contains("Contract violation"));
    }
}
