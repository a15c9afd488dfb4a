use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use academia_api::config::AppConfig;
use academia_infra::Stores;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    academia_observability::init(AppConfig::log_format_from_env());

    let config = AppConfig::from_env().context("invalid configuration")?;
    if config.uses_dev_secret() {
        if config.environment.is_production() {
            tracing::error!(
                event = "insecure_jwt_secret",
                "JWT secret not set; signing with the dev default in production"
            );
        } else {
            tracing::warn!(
                event = "insecure_jwt_secret",
                "JWT secret not set; using insecure dev default"
            );
        }
    }

    let stores = match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            tracing::info!("using postgres stores");
            Stores::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores");
            Stores::in_memory()
        }
    };

    let bind_addr = config.bind_addr;
    let app = academia_api::app::build_app(config, stores)
        .await
        .context("failed to start services")?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
