use assessment_engine::{
    config::{get_config, init_config, Config},
    database::pool::{create_pool, run_migrations},
    middleware::{auth::AuthKeys, cors::permissive_cors},
    repositories::PgAssessmentStore,
    routes,
    services::manual_grading::GradingPolicy,
    utils::time::{Clock, SystemClock},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("assessment_engine=info,tower_http=info"));
    let builder = fmt().with_env_filter(filter).with_target(false);

    if config.log_json {
        builder
            .json()
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;
    init_tracing(config)?;

    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;

    let store = Arc::new(PgAssessmentStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let policy = GradingPolicy::new(config.manual_correct_threshold);
    let app_state = AppState::new(store, clock.clone(), policy);

    {
        let attempt_service = app_state.attempt_service.clone();
        let interval = Duration::from_secs(config.abandon_sweep_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                match attempt_service.abandon_expired_attempts(clock.now()).await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "abandoned expired attempts"),
                    Err(e) => tracing::error!(error = ?e, "abandonment sweep failed"),
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    let app = routes::router(app_state, AuthKeys::new(&config.jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(permissive_cors());

    let listener = TcpListener::bind(&config.server_address).await?;
    info!("Server listening on {}", config.server_address);
    axum::serve(listener, app).await?;

    Ok(())
}
