//! Reminders binary (§4.3): runs the short-ladder dojim and the
//! interview-reminder consumer as two cooperating services.

use std::time::Duration;

use agent_core::cli::RecruiterFilter;
use agent_core::reminders::{DojimService, InterviewReminderService, RemindersContext};
use agent_core::service::Supervisor;
use anyhow::Result;
use clap::Parser;
use jobboard_client::JobBoardClient;
use recruiting_common::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    recruiters: RecruiterFilter,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,agent_core=debug,sqlx=warn".into()))
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let recruiter_ids = args.recruiters.ids()?;

    let db = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;

    let job_board = JobBoardClient::with_limits(
        config.job_board_client_id.clone(),
        config.job_board_client_secret.clone(),
        config.job_board_rate_limit_per_sec,
        config.job_board_concurrency_limit,
    );
    let token_refresher = agent_core::token_refresh::TokenRefresher::new(job_board.clone());

    let ctx = RemindersContext {
        db,
        job_board,
        token_refresher,
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
            let recruiter_ids = recruiter_ids.clone();
            move || {
                Box::new(DojimService {
                    ctx: ctx.clone(),
                    recruiter_ids: recruiter_ids.clone(),
                }) as Box<dyn agent_core::service::Service>
            }
        }))
        .with_service(Box::new({
            let ctx = ctx.clone();
            move || Box::new(InterviewReminderService { ctx: ctx.clone() }) as Box<dyn agent_core::service::Service>
        }));

    supervisor.run_until_shutdown(shutdown).await?;
    Ok(())
}
