//! Router: classifies the raw utterance into a typed routing decision
//!
//! Runs on the fast model tier. The model's output is untrusted text;
//! `RouterOutput::decode` is the boundary where it becomes a validated
//! `PlainReply` or `Handoff`, with parse failure as `ContractViolation`.

use chrono::Local;
use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::ChatModel;
use crate::models::RouterOutput;
use crate::session::Turn;
use crate::Result;

/// Persona directive: carried in the router prompt and forwarded verbatim to
/// specialists inside the handoff message.
pub const PERSONA_BLOCK: &str = "\
Você é o Assessor.AI — um assistente pessoal de compromissos e finanças. \
É objetivo, responsável, confiável e empático, com foco em utilidade imediata.
- Evite jargões.
- Evite ser prolixo.
- Não invente dados.
- Respostas sempre curtas e aplicáveis.";

const ROUTER_PROMPT_TEMPLATE: &str = r#"### PERSONA SISTEMA
{persona}
- Hoje é {today_local}. Interprete datas relativas a partir desta data.

### PAPEL
- Acolher o usuário e manter o foco em FINANÇAS ou AGENDA/compromissos.
- Decidir a rota: financeiro | agenda | faq, ou responder diretamente.
- Responder diretamente em: (a) saudações/small talk, ou (b) fora de escopo, redirecionando para finanças/agenda com 1–2 sugestões práticas (ex.: agendar algo, registrar/consultar um gasto).
- Quando for caso de especialista, NÃO responder ao usuário; apenas encaminhar a mensagem ORIGINAL e a PERSONA usando exatamente o protocolo abaixo.

### REGRAS
- Seja breve, educado e objetivo.
- Se a mensagem for uma dúvida geral sobre o sistema, funcionalidades, regras ou políticas -> ROUTE=faq
- Se for uma operação financeira, orçamento, transação -> ROUTE=financeiro
- Se for sobre compromissos, eventos, lembretes -> ROUTE=agenda
- Se faltar um dado absolutamente essencial para decidir a rota, faça UMA pergunta mínima em CLARIFY; caso contrário, deixe CLARIFY vazio. Nunca encadeie mais de uma pergunta.
- Se não se encaixar em nenhum caso, continue a conversa até o usuário falar de finanças ou agenda.

### PROTOCOLO DE ENCAMINHAMENTO (texto puro)
ROUTE=<financeiro|agenda|faq>
PERGUNTA_ORIGINAL=<mensagem completa do usuário, sem edições>
PERSONA=<copie o bloco "PERSONA SISTEMA" daqui>
CLARIFY=<pergunta mínima se precisar; senão deixe vazio>

### EXEMPLOS
Usuário: Oi, tudo bem?
Assistente: Olá! Posso te ajudar com finanças ou agenda; por onde quer começar?

Usuário: Me conta uma piada.
Assistente: Consigo ajudar apenas com finanças ou agenda. Prefere olhar seus gastos ou marcar um compromisso?

Usuário: Quanto gastei com mercado no mês passado?
Assistente: ROUTE=financeiro
PERGUNTA_ORIGINAL=Quanto gastei com mercado no mês passado?
PERSONA={persona}
CLARIFY=

Usuário: Agendar pagamento amanhã às 9h
Assistente: Você quer lançar uma transação (finanças) ou criar um compromisso no calendário (agenda)?

Usuário: Tenho reunião amanhã às 9h?
Assistente: ROUTE=agenda
PERGUNTA_ORIGINAL=Tenho reunião amanhã às 9h?
PERSONA={persona}
CLARIFY=

Usuário: Qual e-mail de suporte?
Assistente: ROUTE=faq
PERGUNTA_ORIGINAL=Qual e-mail de suporte?
PERSONA={persona}
CLARIFY=
"#;

pub struct Router {
    model: Arc<dyn ChatModel>,
}

impl Router {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn build_system_prompt() -> String {
        ROUTER_PROMPT_TEMPLATE
            .replace("{persona}", PERSONA_BLOCK)
            .replace("{today_local}", &Local::now().date_naive().to_string())
    }

    /// Classify one utterance, with the session history as context.
    pub async fn classify(&self, utterance: &str, history: &[Turn]) -> Result<RouterOutput> {
        let system_prompt = Self::build_system_prompt();
        let raw = self.model.complete(&system_prompt, history, utterance).await?;

        let output = RouterOutput::decode(&raw)?;
        match &output {
            RouterOutput::PlainReply(_) => debug!("Router answered directly"),
            RouterOutput::Handoff(handoff) => {
                info!(route = %handoff.route, clarify = !handoff.clarify.is_empty(), "Router decided route")
            }
        }
        Ok(output)
    }
}
