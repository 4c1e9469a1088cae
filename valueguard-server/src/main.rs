use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use valueguard_core::config::AppConfig;
use valueguard_core::queries::merged_feed;
use valueguard_core::seed::write_demo_profiles;
use valueguard_core::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let demo = std::env::args().any(|arg| arg == "--demo");
    let config = AppConfig::from_env();
    let state = AppState::open(&config)?;

    if config.seed_demo || demo {
        write_demo_profiles(state.store.as_ref(), &state.catalog)?;
    }
    if demo {
        for incident in merged_feed(&state)? {
            println!(
                "{}  {}  {}  [{}]",
                incident.date.format("%Y-%m-%d"),
                incident.company_name,
                incident.title,
                incident.categories.join(", ")
            );
        }
    }
    if config.llm.is_none() {
        tracing::info!("no llm api key configured; /categorize is disabled");
    }

    let app = valueguard_server::routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(bind = %config.bind, db = %config.db_path, "valueguard-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
