use seesay::{app, config::AppConfig, logging, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let config = AppConfig::from_env()?;
    let app_state = AppState::init(&config).await?;
    let store = app_state.store.clone();

    let result = app::serve(app::build_app(app_state), &config.host, config.port).await;
    store.close_connection().await;
    result
}
