use assessor_agent::{
    faq::{ContextRetriever, FaqAgent, FileFaqRetriever},
    llm::GeminiModel,
    orchestrator::Orchestrator,
    router::Router,
    session::SessionStore,
    specialist::SpecialistAgent,
    tools::{build_transaction_store, create_transaction_registry},
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use uuid::Uuid;

/// Reserved exit tokens (case-insensitive) for the read-loop.
const EXIT_TOKENS: &[&str] = &["sair", "end", "fim", "tchau", "bye", "tchautchau"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("GEMINI_API_KEY not set in .env; model calls will fail");
        String::new()
    });

    info!("Assessor.AI starting");

    // Create components
    let store = build_transaction_store();
    let registry = Arc::new(create_transaction_registry(store));

    let router_model = Arc::new(GeminiModel::router_tier(gemini_api_key.clone()));
    let specialist_model = Arc::new(GeminiModel::specialist_tier(gemini_api_key));

    let faq_path = std::env::var("FAQ_PATH").unwrap_or_else(|_| "FAQ.md".to_string());
    let retriever: Arc<dyn ContextRetriever> = match FileFaqRetriever::from_file(&faq_path) {
        Ok(retriever) => Arc::new(retriever),
        Err(e) => {
            warn!("FAQ document `{}` not loaded ({}); FAQ answers will fall back", faq_path, e);
            Arc::new(FileFaqRetriever::from_text(""))
        }
    };

    // Create orchestrator
    let orchestrator = Orchestrator::new(
        Router::new(router_model.clone()),
        SpecialistAgent::finance(specialist_model.clone(), registry.clone()),
        SpecialistAgent::agenda(specialist_model, registry),
        FaqAgent::new(retriever, router_model),
        SessionStore::new(),
    );

    // Interactive surface is single-user: one session per process run.
    let session_id = Uuid::new_v4().to_string();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> | ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if EXIT_TOKENS.contains(&line.to_lowercase().as_str()) {
            println!("Encerrando a conversa");
            break;
        }

        let answer = orchestrator.dispatch(line, &session_id).await;
        println!("{}\n", answer);
    }

    Ok(())
}
