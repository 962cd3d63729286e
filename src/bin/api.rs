use assessor_agent::{
    api::start_server,
    faq::{ContextRetriever, FaqAgent, FileFaqRetriever},
    llm::GeminiModel,
    orchestrator::Orchestrator,
    router::Router,
    session::SessionStore,
    specialist::SpecialistAgent,
    tools::{build_transaction_store, create_transaction_registry},
};
use std::sync::Arc;
use tracing::{info, warn};

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

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Assessor.AI - API Server");
    info!("Port: {}", api_port);

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
    let orchestrator = Arc::new(Orchestrator::new(
        Router::new(router_model.clone()),
        SpecialistAgent::finance(specialist_model.clone(), registry.clone()),
        SpecialistAgent::agenda(specialist_model, registry),
        FaqAgent::new(retriever, router_model),
        SessionStore::new(),
    ));

    info!("Orchestrator initialized");

    // Start API server
    start_server(orchestrator, api_port).await?;

    Ok(())
}
