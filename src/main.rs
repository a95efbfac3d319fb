use daybook::config::Config;
use daybook::db::Database;
use daybook::http::{router, AppState};
use daybook::service::AppCore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)?;
    daybook::init_tracing(&config.data_dir).map_err(anyhow::Error::msg)?;

    let db = Arc::new(Database::new(&config.data_dir.join("daybook.db"))?);
    let core = AppCore::new(db, &config);
    core.ensure_bootstrap_admin(&config)?;

    // Expired sessions are also purged lazily on resolve; the sweep
    // keeps the table from accumulating rows for idle tokens.
    tokio::spawn({
        let sessions = core.sessions.clone();
        async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match sessions.purge_expired() {
                    Ok(purged) if purged > 0 => {
                        info!(purged, "purged expired sessions");
                    }
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "session sweep failed"),
                }
            }
        }
    });

    let state = AppState {
        core,
        session_ttl_seconds: config.session_ttl_seconds,
    };
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
