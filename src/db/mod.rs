pub mod users;

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::DatabaseConfig;
use crate::error::StartupError;

/// Build the pool, wait for the database to answer, then apply pending
/// migrations. The returned pool is ready to serve requests.
pub async fn connect(
    config: &DatabaseConfig,
    cancel: &CancellationToken,
) -> Result<PgPool, StartupError> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_lazy_with(options);

    wait_until_reachable(&pool, config.ping_interval, config.connect_timeout, cancel).await?;
    tracing::info!(host = %config.host, database = %config.database, "Connected to database");

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Ping every `interval` until the database answers or `timeout` elapses.
pub async fn wait_until_reachable(
    pool: &PgPool,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), StartupError> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempts = 0u32;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StartupError::Cancelled),
            _ = &mut deadline => return Err(StartupError::StoreUnavailable { attempts, timeout }),
            _ = ticker.tick() => {
                attempts += 1;
                match tokio::time::timeout(interval, ping(pool)).await {
                    Ok(Ok(())) => return Ok(()),
                    Ok(Err(e)) => tracing::warn!(attempt = attempts, error = %e, "Database ping failed"),
                    Err(_) => tracing::warn!(attempt = attempts, "Database ping timed out"),
                }
            }
        }
    }
}

async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply every pending migration in version order. Already-applied
/// migrations are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StartupError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Migrations applied");
    Ok(())
}
