//! Core data models for the assessor dispatch pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AssessorError, Result};

//
// ================= Routes =================
//

/// Literal marker the router emits when it decided on a specialist route.
/// Confined to the protocol decoder; everything downstream is typed.
pub const ROUTE_MARKER: &str = "ROUTE=";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Financeiro,
    Agenda,
    Faq,
}

impl Route {
    pub fn parse(label: &str) -> Option<Route> {
        match label.trim().to_lowercase().as_str() {
            "financeiro" => Some(Route::Financeiro),
            "agenda" => Some(Route::Agenda),
            "faq" => Some(Route::Faq),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Financeiro => "financeiro",
            Route::Agenda => "agenda",
            Route::Faq => "faq",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Specialist domains. FAQ answers free text and has no JSON contract,
/// so it is a `Route` but not a `Domain`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Financeiro,
    Agenda,
}

impl Domain {
    pub fn parse(label: &str) -> Option<Domain> {
        match label.trim().to_lowercase().as_str() {
            "financeiro" => Some(Domain::Financeiro),
            "agenda" => Some(Domain::Agenda),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Financeiro => "financeiro",
            Domain::Agenda => "agenda",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Intents =================
//

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinanceIntent {
    Consultar,
    Inserir,
    Atualizar,
    Deletar,
    Resumo,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgendaIntent {
    Consultar,
    Criar,
    Atualizar,
    Cancelar,
    Listar,
    Disponibilidade,
    Conflitos,
}

/// Domain-checked intent. Labels overlap between domains ("consultar",
/// "atualizar"), so resolution always goes through the owning domain.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Intent {
    Financeiro(FinanceIntent),
    Agenda(AgendaIntent),
}

impl Intent {
    /// Resolve an intent label within the domain that produced it.
    pub fn for_domain(domain: Domain, label: &str) -> Option<Intent> {
        let label = label.trim().to_lowercase();
        match domain {
            Domain::Financeiro => {
                let intent = match label.as_str() {
                    "consultar" => FinanceIntent::Consultar,
                    "inserir" => FinanceIntent::Inserir,
                    "atualizar" => FinanceIntent::Atualizar,
                    "deletar" => FinanceIntent::Deletar,
                    "resumo" => FinanceIntent::Resumo,
                    _ => return None,
                };
                Some(Intent::Financeiro(intent))
            }
            Domain::Agenda => {
                let intent = match label.as_str() {
                    "consultar" => AgendaIntent::Consultar,
                    "criar" => AgendaIntent::Criar,
                    "atualizar" => AgendaIntent::Atualizar,
                    "cancelar" => AgendaIntent::Cancelar,
                    "listar" => AgendaIntent::Listar,
                    "disponibilidade" => AgendaIntent::Disponibilidade,
                    "conflitos" => AgendaIntent::Conflitos,
                    _ => return None,
                };
                Some(Intent::Agenda(intent))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Financeiro(FinanceIntent::Consultar) => "consultar",
            Intent::Financeiro(FinanceIntent::Inserir) => "inserir",
            Intent::Financeiro(FinanceIntent::Atualizar) => "atualizar",
            Intent::Financeiro(FinanceIntent::Deletar) => "deletar",
            Intent::Financeiro(FinanceIntent::Resumo) => "resumo",
            Intent::Agenda(AgendaIntent::Consultar) => "consultar",
            Intent::Agenda(AgendaIntent::Criar) => "criar",
            Intent::Agenda(AgendaIntent::Atualizar) => "atualizar",
            Intent::Agenda(AgendaIntent::Cancelar) => "cancelar",
            Intent::Agenda(AgendaIntent::Listar) => "listar",
            Intent::Agenda(AgendaIntent::Disponibilidade) => "disponibilidade",
            Intent::Agenda(AgendaIntent::Conflitos) => "conflitos",
        }
    }
}

//
// ================= Handoff Protocol =================
//

/// Structured package passed from the router to a specialist.
/// Produced once per routed turn, consumed exactly once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffMessage {
    pub route: Route,
    /// Verbatim copy of the user's utterance.
    pub original_question: String,
    /// Opaque persona directive forwarded to the specialist prompt.
    pub persona_block: String,
    /// Single minimal clarifying question, empty when none is needed.
    pub clarify: String,
}

impl HandoffMessage {
    /// Re-serialize as the plain-text forwarding protocol the specialist
    /// receives as its task input.
    pub fn encode(&self) -> String {
        format!(
            "ROUTE={}\nPERGUNTA_ORIGINAL={}\nPERSONA={}\nCLARIFY={}",
            self.route, self.original_question, self.persona_block, self.clarify
        )
    }

    /// Parse the protocol block out of raw router output. The block starts
    /// at the first `ROUTE=` marker; `PERSONA=` may span multiple lines and
    /// runs until the `CLARIFY=` field.
    pub fn decode(raw: &str) -> Result<HandoffMessage> {
        let start = raw.find(ROUTE_MARKER).ok_or_else(|| {
            AssessorError::ContractViolation("router output has no ROUTE= marker".to_string())
        })?;

        let mut route_label: Option<&str> = None;
        let mut question: Option<&str> = None;
        let mut persona_lines: Vec<&str> = Vec::new();
        let mut clarify = String::new();
        let mut in_persona = false;

        for line in raw[start..].lines() {
            if let Some(value) = line.strip_prefix("ROUTE=") {
                route_label = Some(value);
                in_persona = false;
            } else if let Some(value) = line.strip_prefix("PERGUNTA_ORIGINAL=") {
                question = Some(value);
                in_persona = false;
            } else if let Some(value) = line.strip_prefix("PERSONA=") {
                persona_lines.push(value);
                in_persona = true;
            } else if let Some(value) = line.strip_prefix("CLARIFY=") {
                clarify = value.trim().to_string();
                in_persona = false;
            } else if in_persona {
                persona_lines.push(line);
            }
        }

        let route_label = route_label.ok_or_else(|| {
            AssessorError::ContractViolation("handoff is missing the ROUTE field".to_string())
        })?;
        let route = Route::parse(route_label).ok_or_else(|| {
            AssessorError::ContractViolation(format!("unknown route `{}`", route_label.trim()))
        })?;

        let original_question = question
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                AssessorError::ContractViolation(
                    "handoff is missing the PERGUNTA_ORIGINAL field".to_string(),
                )
            })?
            .to_string();

        Ok(HandoffMessage {
            route,
            original_question,
            persona_block: persona_lines.join("\n").trim().to_string(),
            clarify,
        })
    }
}

/// Typed routing decision. Absence of the route marker in the router's raw
/// output means the text is a direct reply, returned to the user verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterOutput {
    PlainReply(String),
    Handoff(HandoffMessage),
}

impl RouterOutput {
    pub fn decode(raw: &str) -> Result<RouterOutput> {
        if !raw.contains(ROUTE_MARKER) {
            return Ok(RouterOutput::PlainReply(raw.trim().to_string()));
        }
        Ok(RouterOutput::Handoff(HandoffMessage::decode(raw)?))
    }
}

//
// ================= Specialist Contract =================
//

/// Validated specialist output. Construction goes through
/// `contract::decode_specialist_result`; immutable afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpecialistResult {
    pub domain: Domain,
    pub intent: Intent,
    /// One factual sentence, rendered verbatim as the first output line.
    pub reply: String,
    /// Practical next action; may be empty.
    pub recommendation: String,
    pub followup: Option<String>,
    pub clarify_question: Option<String>,
    pub time_window: Option<TimeWindow>,
    pub event: Option<EventDetails>,
    pub write_op: Option<WriteOp>,
    pub metrics: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeWindow {
    #[serde(rename = "de")]
    pub from: String,
    #[serde(rename = "ate")]
    pub to: String,
    #[serde(rename = "rotulo", default)]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDetails {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "data", default)]
    pub date: Option<String>,
    #[serde(rename = "inicio", default)]
    pub start: Option<String>,
    #[serde(rename = "fim", default)]
    pub end: Option<String>,
    #[serde(rename = "local", default)]
    pub location: Option<String>,
    #[serde(rename = "participantes", default)]
    pub attendees: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WriteOperation {
    Adicionar,
    Atualizar,
    Deletar,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WriteOp {
    #[serde(rename = "operacao")]
    pub operation: WriteOperation,
    pub id: i64,
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handoff_roundtrip() {
        let handoff = HandoffMessage {
            route: Route::Financeiro,
            original_question: "Quanto gastei com mercado no mês passado?".to_string(),
            persona_block: "Seja objetivo.\nNão invente dados.".to_string(),
            clarify: String::new(),
        };

        let decoded = HandoffMessage::decode(&handoff.encode()).unwrap();
        assert_eq!(decoded, handoff);
    }

    #[test]
    fn test_decode_plain_reply_without_marker() {
        let raw = "Olá! Posso te ajudar com finanças ou agenda; por onde quer começar?";
        match RouterOutput::decode(raw).unwrap() {
            RouterOutput::PlainReply(text) => assert_eq!(text, raw),
            other => panic!("expected plain reply, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_handoff_with_clarify() {
        let raw = "ROUTE=agenda\nPERGUNTA_ORIGINAL=Agendar revisão na sexta\nPERSONA=Seja breve.\nCLARIFY=Qual horário você prefere na sexta?";
        match RouterOutput::decode(raw).unwrap() {
            RouterOutput::Handoff(handoff) => {
                assert_eq!(handoff.route, Route::Agenda);
                assert_eq!(handoff.original_question, "Agendar revisão na sexta");
                assert_eq!(handoff.clarify, "Qual horário você prefere na sexta?");
            }
            other => panic!("expected handoff, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_tolerates_preamble_before_marker() {
        let raw = "Encaminhando.\nROUTE=faq\nPERGUNTA_ORIGINAL=Qual e-mail de suporte?\nPERSONA=\nCLARIFY=";
        match RouterOutput::decode(raw).unwrap() {
            RouterOutput::Handoff(handoff) => {
                assert_eq!(handoff.route, Route::Faq);
                assert_eq!(handoff.original_question, "Qual e-mail de suporte?");
                assert!(handoff.clarify.is_empty());
            }
            other => panic!("expected handoff, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_route_is_violation() {
        let raw = "ROUTE=clima\nPERGUNTA_ORIGINAL=Vai chover amanhã?\nPERSONA=\nCLARIFY=";
        let err = RouterOutput::decode(raw).unwrap_err();
        assert!(matches!(err, AssessorError::ContractViolation(_)));
    }

    #[test]
    fn test_decode_missing_question_is_violation() {
        let raw = "ROUTE=financeiro\nPERSONA=\nCLARIFY=";
        let err = RouterOutput::decode(raw).unwrap_err();
        assert!(matches!(err, AssessorError::ContractViolation(_)));
    }

    #[test]
    fn test_intent_labels_are_domain_checked() {
        assert!(Intent::for_domain(Domain::Financeiro, "consultar").is_some());
        assert!(Intent::for_domain(Domain::Financeiro, "criar").is_none());
        assert!(Intent::for_domain(Domain::Agenda, "disponibilidade").is_some());
        assert!(Intent::for_domain(Domain::Agenda, "resumo").is_none());
        assert_eq!(
            Intent::for_domain(Domain::Agenda, "Consultar").unwrap().as_str(),
            "consultar"
        );
    }
}
