//! Specialist agents for the finance and agenda domains
//!
//! A specialist receives the re-serialized handoff message as its only task
//! input, may invoke tools in a bounded loop, and must end with the JSON
//! contract, validated at the boundary by the contract module.

use chrono::Local;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::contract::{decode_specialist_turn, SpecialistTurn};
use crate::error::AssessorError;
use crate::llm::ChatModel;
use crate::models::{Domain, HandoffMessage, SpecialistResult, ToolInput};
use crate::session::Turn;
use crate::tools::ToolRegistry;
use crate::Result;

/// Tool budget per routed turn.
const MAX_TOOL_ROUNDS: u32 = 5;

const FINANCE_PROMPT_TEMPLATE: &str = r#"### OBJETIVO
Interpretar a PERGUNTA_ORIGINAL sobre finanças e operar as ferramentas de transações para responder.
A saída final SEMPRE é JSON (contrato abaixo) para o Orquestrador.

### CONTEXTO
- Hoje é {today_local}. Interprete datas relativas a partir desta data.
- Entrada vem do Roteador via protocolo:
  ROUTE=financeiro
  PERGUNTA_ORIGINAL=...
  PERSONA=...   (use como diretriz de concisão/objetividade)
  CLARIFY=...   (se preenchido, priorize responder esta dúvida antes de prosseguir)

### FERRAMENTAS
{tool_catalog}

Para usar uma ferramenta, responda SOMENTE com:
{"tool":"<nome>","args":{...}}
O resultado chega como RESULTADO_FERRAMENTA na mensagem seguinte. No máximo uma ferramenta por vez.
- Não invente números ou datas: use apenas o que as ferramentas retornarem.
- Se uma ferramenta falhar, relate o problema em `resposta`.

### SAÍDA FINAL (JSON)
# Obrigatórios:
 - dominio   : "financeiro"
 - intencao  : "consultar" | "inserir" | "atualizar" | "deletar" | "resumo"
 - resposta  : uma frase objetiva
 - recomendacao : ação prática (pode ser string vazia se não houver)
# Opcionais (incluir só se necessário):
 - acompanhamento : texto curto de follow-up/próximo passo
 - esclarecer     : pergunta mínima de clarificação (usar OU 'acompanhamento', nunca ambos)
 - escrita        : {"operacao":"adicionar|atualizar|deletar","id":123}
 - janela_tempo   : {"de":"YYYY-MM-DD","ate":"YYYY-MM-DD","rotulo":"mês passado"}
 - indicadores    : {chaves livres e numéricas úteis ao log}

### EXEMPLOS
Entrada: ROUTE=financeiro / PERGUNTA_ORIGINAL=Quanto gastei com mercado no mês passado?
Saída final: {"dominio":"financeiro","intencao":"consultar","resposta":"Você gastou R$ 842,75 com 'comida' no mês passado.","recomendacao":"Quer detalhar por estabelecimento?","janela_tempo":{"de":"2025-08-01","ate":"2025-08-31","rotulo":"mês passado (ago/2025)"}}

Entrada: ROUTE=financeiro / PERGUNTA_ORIGINAL=Quero um resumo dos gastos
Saída final: {"dominio":"financeiro","intencao":"resumo","resposta":"Preciso do período para seguir.","recomendacao":"","esclarecer":"Qual período considerar (ex.: hoje, esta semana, mês passado)?"}
"#;

const AGENDA_PROMPT_TEMPLATE: &str = r#"### OBJETIVO
Interpretar a PERGUNTA_ORIGINAL sobre agenda/compromissos e consultar/criar/atualizar/cancelar eventos.
A saída final SEMPRE é JSON (contrato abaixo) para o Orquestrador.

### CONTEXTO
- Hoje é {today_local}. Interprete datas relativas a partir desta data.
- Entrada do Roteador:
  ROUTE=agenda
  PERGUNTA_ORIGINAL=...
  PERSONA=...   (use como diretriz de concisão/objetividade)
  CLARIFY=...   (se preenchido, responda primeiro)

### FERRAMENTAS
{tool_catalog}

Para usar uma ferramenta, responda SOMENTE com:
{"tool":"<nome>","args":{...}}
O resultado chega como RESULTADO_FERRAMENTA na mensagem seguinte. No máximo uma ferramenta por vez.
- Não invente datas ou horários: use apenas o que as ferramentas retornarem.
- Se uma ferramenta falhar, relate o problema em `resposta`.

### SAÍDA FINAL (JSON)
# Obrigatórios:
 - dominio   : "agenda"
 - intencao  : "consultar" | "criar" | "atualizar" | "cancelar" | "listar" | "disponibilidade" | "conflitos"
 - resposta  : uma frase objetiva
 - recomendacao : ação prática (pode ser string vazia)
# Opcionais (incluir só se necessário):
 - acompanhamento : texto curto de follow-up/próximo passo
 - esclarecer     : pergunta mínima de clarificação (usar OU 'acompanhamento', nunca ambos)
 - janela_tempo   : {"de":"YYYY-MM-DDTHH:MM","ate":"YYYY-MM-DDTHH:MM","rotulo":"ex.: 'amanhã 09:00–10:00'"}
 - evento         : {"titulo":"...","data":"YYYY-MM-DD","inicio":"HH:MM","fim":"HH:MM","local":"...","participantes":["..."]}

### EXEMPLOS
Entrada: ROUTE=agenda / PERGUNTA_ORIGINAL=Tenho janela amanhã à tarde?
Saída final: {"dominio":"agenda","intencao":"disponibilidade","resposta":"Você está livre amanhã das 14:00 às 16:00.","recomendacao":"Quer reservar 15:00–16:00?","janela_tempo":{"de":"2025-09-29T14:00","ate":"2025-09-29T16:00","rotulo":"amanhã 14:00–16:00"}}

Entrada: ROUTE=agenda / PERGUNTA_ORIGINAL=Agendar revisão do orçamento na sexta
Saída final: {"dominio":"agenda","intencao":"criar","resposta":"Preciso do horário para agendar.","recomendacao":"","esclarecer":"Qual horário você prefere na sexta?"}
"#;

pub struct SpecialistAgent {
    domain: Domain,
    prompt_template: &'static str,
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
}

impl SpecialistAgent {
    pub fn finance(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            domain: Domain::Financeiro,
            prompt_template: FINANCE_PROMPT_TEMPLATE,
            model,
            tools,
        }
    }

    pub fn agenda(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            domain: Domain::Agenda,
            prompt_template: AGENDA_PROMPT_TEMPLATE,
            model,
            tools,
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    fn build_system_prompt(&self) -> String {
        self.prompt_template
            .replace("{today_local}", &Local::now().date_naive().to_string())
            .replace("{tool_catalog}", &self.tools.catalog())
    }

    /// Run one routed turn: bounded tool-call loop ending in a validated
    /// contract result.
    pub async fn handle(
        &self,
        handoff: &HandoffMessage,
        history: &[Turn],
    ) -> Result<SpecialistResult> {
        let system_prompt = self.build_system_prompt();
        let mut input = handoff.encode();

        for round in 0..MAX_TOOL_ROUNDS {
            let raw = self.model.complete(&system_prompt, history, &input).await?;

            match decode_specialist_turn(self.domain, &raw)? {
                SpecialistTurn::Final(result) => {
                    info!(
                        domain = %self.domain,
                        intent = result.intent.as_str(),
                        tool_rounds = round,
                        "Specialist produced result"
                    );
                    return Ok(result);
                }
                SpecialistTurn::ToolCall { name, args } => {
                    debug!(domain = %self.domain, tool = %name, "Specialist requested tool");
                    let observation = self.run_tool(&name, args).await;
                    input.push_str("\n\nRESULTADO_FERRAMENTA ");
                    input.push_str(&name);
                    input.push_str(":\n");
                    input.push_str(&observation.to_string());
                }
            }
        }

        Err(AssessorError::ContractViolation(format!(
            "specialist for `{}` exhausted {} tool rounds without a final result",
            self.domain, MAX_TOOL_ROUNDS
        )))
    }

    /// Execute one tool call. Failures become error observations the model
    /// must report in `resposta`; they never abort the turn.
    async fn run_tool(&self, name: &str, args: Value) -> Value {
        match self.try_tool(name, args).await {
            Ok(data) => data,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                json!({ "status": "error", "message": e.to_string() })
            }
        }
    }

    async fn try_tool(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AssessorError::ToolNotFound(name.to_string()))?;

        let input = ToolInput {
            tool_name: name.to_string(),
            parameters: args,
        };

        let output = tool.execute(&input).await?;
        Ok(output.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::models::{FinanceIntent, Intent, Route};
    use crate::tools::store::InMemoryTransactionStore;
    use crate::tools::create_transaction_registry;

    fn handoff(route: Route, question: &str) -> HandoffMessage {
        HandoffMessage {
            route,
            original_question: question.to_string(),
            persona_block: "Seja objetivo.".to_string(),
            clarify: String::new(),
        }
    }

    fn finance_agent(responses: &[&str]) -> SpecialistAgent {
        let registry = Arc::new(create_transaction_registry(Arc::new(
            InMemoryTransactionStore::new(),
        )));
        SpecialistAgent::finance(
            Arc::new(ScriptedModel::new(responses.iter().copied())),
            registry,
        )
    }

    const FINAL_JSON: &str = r#"{"dominio":"financeiro","intencao":"consultar","resposta":"Você não tem lançamentos no período.","recomendacao":""}"#;

    #[tokio::test]
    async fn test_final_without_tools() {
        let agent = finance_agent(&[FINAL_JSON]);
        let result = agent
            .handle(&handoff(Route::Financeiro, "Quanto gastei?"), &[])
            .await
            .unwrap();
        assert_eq!(result.intent, Intent::Financeiro(FinanceIntent::Consultar));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_observation() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"tool":"delete_everything","args":{}}"#,
            FINAL_JSON,
        ]));
        let registry = Arc::new(create_transaction_registry(Arc::new(
            InMemoryTransactionStore::new(),
        )));
        let agent = SpecialistAgent::finance(model.clone(), registry);

        let result = agent
            .handle(&handoff(Route::Financeiro, "apaga tudo"), &[])
            .await
            .unwrap();
        assert_eq!(result.domain, Domain::Financeiro);

        let inputs = model.seen_inputs.lock().unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(inputs[0].starts_with("ROUTE=financeiro"));
        assert!(inputs[1].contains("RESULTADO_FERRAMENTA delete_everything"));
        assert!(inputs[1].contains("Tool not found"));
    }

    #[tokio::test]
    async fn test_tool_result_reaches_next_round() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"tool":"total_balance","args":{}}"#,
            FINAL_JSON,
        ]));
        let registry = Arc::new(create_transaction_registry(Arc::new(
            InMemoryTransactionStore::new(),
        )));
        let agent = SpecialistAgent::finance(model.clone(), registry);

        agent
            .handle(&handoff(Route::Financeiro, "Qual meu saldo?"), &[])
            .await
            .unwrap();

        let inputs = model.seen_inputs.lock().unwrap();
        assert!(inputs[1].contains("RESULTADO_FERRAMENTA total_balance"));
        assert!(inputs[1].contains("\"balance\""));
    }

    #[tokio::test]
    async fn test_exhausted_tool_budget_is_violation() {
        let directive = r#"{"tool":"total_balance","args":{}}"#;
        let agent = finance_agent(&[directive; 6]);

        let err = agent
            .handle(&handoff(Route::Financeiro, "Qual meu saldo?"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AssessorError::ContractViolation(_)));
    }

    #[tokio::test]
    async fn test_invalid_final_json_is_violation() {
        let agent = finance_agent(&["tudo certo, saldo é 10"]);
        let err = agent
            .handle(&handoff(Route::Financeiro, "saldo?"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AssessorError::ContractViolation(_)));
    }

    #[tokio::test]
    async fn test_wrong_domain_in_final_is_violation() {
        let raw = r#"{"dominio":"agenda","intencao":"consultar","resposta":"Ok.","recomendacao":""}"#;
        let agent = finance_agent(&[raw]);
        let err = agent
            .handle(&handoff(Route::Financeiro, "saldo?"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AssessorError::ContractViolation(_)));
    }
}
