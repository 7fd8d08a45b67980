//! Processor binary (§4.2): claims dialogues with pending messages and
//! advances each through one LLM turn.

use std::sync::Arc;
use std::time::Duration;

use agent_core::cli::RecruiterFilter;
use agent_core::processor::prompt::FilePromptLibrarySource;
use agent_core::processor::{ProcessorContext, ProcessorService};
use agent_core::service::Supervisor;
use anyhow::Result;
use clap::Parser;
use jobboard_client::JobBoardClient;
use llm_client::AnthropicClient;
use recruiting_common::prompt_library::CachedPromptLibrary;
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

    // The `--recruiters` filter is accepted here for CLI-surface parity
    // with the other three binaries (§6), though the processor claims work
    // by dialogue readiness rather than by recruiter, so it isn't consumed
    // below.
    let args = Args::parse();
    let _ = args.recruiters.ids()?;

    let config = Config::from_env()?;

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
    let llm = Arc::new(
        AnthropicClient::with_options(
            config.anthropic_api_key.clone(),
            config.llm_proxy_url.as_deref(),
            config.llm_concurrency_limit,
        )
        .with_default_model("claude-3-5-sonnet-20241022"),
    );
    let prompt_source = Arc::new(FilePromptLibrarySource::new(config.knowledge_base_path.clone()));
    let prompt_cache = Arc::new(CachedPromptLibrary::new(Duration::from_secs(
        config.prompt_library_ttl_secs,
    )));

    let ctx = ProcessorContext {
        db,
        job_board,
        token_refresher,
        llm,
        prompt_source,
        prompt_cache,
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
            move || Box::new(ProcessorService { ctx: ctx.clone() }) as Box<dyn agent_core::service::Service>
        }));

    supervisor.run_until_shutdown(shutdown).await?;
    Ok(())
}
