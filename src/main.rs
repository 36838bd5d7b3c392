use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizarena::api::{self, ApiContext};
use quizarena::durable::InMemoryDurableStore;
use quizarena::game::GameEngine;
use quizarena::lobby::LobbyManager;
use quizarena::quiz::{
    OpenAiQuestionSupplier, QuestionSupplier, StaticQuestionSupplier, SupplierConfig,
};
use quizarena::store::{InMemoryStore, KeyValueStore};
use quizarena::sweeper;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quizarena=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting quizarena...");

    let supplier_config = SupplierConfig::from_env();
    let supplier: Arc<dyn QuestionSupplier> = match &supplier_config.openai_api_key {
        Some(api_key) => {
            tracing::info!(model = %supplier_config.openai_model, "using OpenAI question supplier");
            Arc::new(OpenAiQuestionSupplier::new(
                api_key.clone(),
                supplier_config.openai_model.clone(),
                supplier_config.request_timeout,
            ))
        }
        None => {
            tracing::warn!(
                "OPENAI_API_KEY not set, serving questions from the built-in catalog"
            );
            Arc::new(StaticQuestionSupplier::new(builtin_catalog()))
        }
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let durable = Arc::new(InMemoryDurableStore::new());

    let lobbies = Arc::new(LobbyManager::new(store.clone(), durable.clone()));
    let engine = Arc::new(GameEngine::new(store, supplier, durable.clone()));

    let sweep_interval = std::env::var("SWEEP_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1));
    sweeper::spawn_timeout_sweeper(engine.clone(), sweep_interval);

    let app = api::router(ApiContext {
        lobbies,
        engine,
        durable,
    })
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Small general-knowledge bank for running without an AI provider.
fn builtin_catalog() -> Vec<quizarena::types::Question> {
    use quizarena::types::{Answer, Question};

    let bank: [(&str, [&str; 4], usize); 10] = [
        ("Which planet is known as the Red Planet?", ["Mars", "Venus", "Jupiter", "Mercury"], 0),
        ("What is the largest ocean on Earth?", ["Atlantic", "Pacific", "Indian", "Arctic"], 1),
        ("How many continents are there?", ["Five", "Six", "Seven", "Eight"], 2),
        ("Which gas do plants absorb from the air?", ["Oxygen", "Nitrogen", "Helium", "Carbon dioxide"], 3),
        ("What is the chemical symbol for gold?", ["Au", "Ag", "Go", "Gd"], 0),
        ("Which country has the largest population?", ["USA", "India", "Russia", "Brazil"], 1),
        ("What is the longest river in the world?", ["Amazon", "Yangtze", "Nile", "Danube"], 2),
        ("How many strings does a standard violin have?", ["Six", "Five", "Seven", "Four"], 3),
        ("Which element has the atomic number 1?", ["Hydrogen", "Helium", "Oxygen", "Carbon"], 0),
        ("In which city is the Colosseum?", ["Athens", "Rome", "Istanbul", "Cairo"], 1),
    ];

    bank.into_iter()
        .map(|(text, answers, correct)| Question {
            id: ulid::Ulid::new().to_string(),
            question: text.to_string(),
            answers: answers
                .into_iter()
                .enumerate()
                .map(|(i, answer)| Answer {
                    id: ulid::Ulid::new().to_string(),
                    text: answer.to_string(),
                    is_correct: i == correct,
                })
                .collect(),
        })
        .collect()
}
