//! Notifier binary (§4.4): drains the qualified/rejected/inactive dossier
//! queues and runs the daily history-retention sweep, each as its own
//! supervised service with an independent heartbeat.

use std::time::Duration;

use agent_core::cli::RecruiterFilter;
use agent_core::notifier::{
    HistoryCleanupService, InactiveNotifierService, NotifierContext, QualifiedNotifierService,
    RejectedNotifierService,
};
use agent_core::service::Supervisor;
use anyhow::Result;
use clap::Parser;
use messenger_client::MessengerClient;
use recruiting_common::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
struct Args {
    // Accepted for CLI-surface parity (§6); the notifier drains queues
    // rather than iterating recruiters directly.
    #[command(flatten)]
    recruiters: RecruiterFilter,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,agent_core=debug,sqlx=warn".into()))
        .init();

    let args = Args::parse();
    let _ = args.recruiters.ids()?;

    let config = Config::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let messenger = MessengerClient::new(config.messenger_bot_token.clone());

    let ctx = NotifierContext {
        db: db.clone(),
        messenger,
        config: config.clone(),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        }
    });

    let supervisor = Supervisor::new(Duration::from_secs(config.supervisor_liveness_bound_secs))
        .with_service(Box::new({
            let ctx = ctx.clone();
            move || Box::new(QualifiedNotifierService { ctx: ctx.clone() }) as Box<dyn agent_core::service::Service>
        }))
        .with_service(Box::new({
            let ctx = ctx.clone();
            move || Box::new(RejectedNotifierService { ctx: ctx.clone() }) as Box<dyn agent_core::service::Service>
        }))
        .with_service(Box::new({
            let ctx = ctx.clone();
            move || Box::new(InactiveNotifierService { ctx: ctx.clone() }) as Box<dyn agent_core::service::Service>
        }))
        .with_service(Box::new({
            let db = db.clone();
            let retention_days = config.history_retention_days;
            let fixed_hour_utc = config.history_cleanup_hour_utc;
            move || {
                Box::new(HistoryCleanupService {
                    db: db.clone(),
                    retention_days,
                    fixed_hour_utc,
                }) as Box<dyn agent_core::service::Service>
            }
        }));

    supervisor.run_until_shutdown(shutdown).await?;
    Ok(())
}
