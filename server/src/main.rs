mod config;
mod output;

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use platform_db::{DbPool, connect};
use platform_obs::{ObsConfig, init_tracing};
use products_crm::{
    DealFilter, Horizon, LossReasonCategory, NewDeal, PipelineService, SeaOrmPipelineStore, Stage,
};
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::output::{DealView, HistoryView, WinView, error_payload, print_json};

#[derive(Parser, Debug)]
#[command(name = "pipeline-server", version, about = "Deal pipeline operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Create deals and move them through the pipeline.
    #[command(subcommand)]
    Deal(DealCommand),
    /// Pipeline reports over a filtered deal set.
    #[command(subcommand)]
    Pipeline(PipelineCommand),
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
}

#[derive(Subcommand, Debug)]
enum DealCommand {
    Create(CreateArgs),
    /// Move a deal to the next stage.
    Advance {
        id: Uuid,
        #[arg(long)]
        to: Stage,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long)]
        actor: Option<Uuid>,
    },
    Win {
        id: Uuid,
        #[arg(long, help = "Create a project from the won deal")]
        create_project: bool,
        #[arg(long, requires = "create_project")]
        project_name: Option<String>,
        #[arg(long)]
        actor: Option<Uuid>,
    },
    Lose {
        id: Uuid,
        #[arg(long, help = "price, timing, competitor, requirements or other")]
        category: String,
        #[arg(long)]
        notes: String,
        #[arg(long)]
        actor: Option<Uuid>,
    },
    Reopen {
        id: Uuid,
        #[arg(long)]
        actor: Option<Uuid>,
    },
    /// Override the closing probability of an open deal.
    Probability {
        id: Uuid,
        value: u8,
        #[arg(long)]
        actor: Option<Uuid>,
    },
    /// Print the stage history, newest first.
    History { id: Uuid },
    /// Print the activity feed, newest first.
    Activities {
        id: Uuid,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    company: Uuid,
    #[arg(long)]
    customer: Uuid,
    #[arg(long)]
    owner: Uuid,
    #[arg(long, default_value_t = 0)]
    value_cents: i64,
    #[arg(long)]
    currency: Option<String>,
    #[arg(long)]
    stage: Option<Stage>,
    #[arg(long)]
    probability: Option<u8>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    expected_close: Option<NaiveDate>,
    #[arg(long, requires = "loss_notes")]
    loss_category: Option<LossReasonCategory>,
    #[arg(long, requires = "loss_category")]
    loss_notes: Option<String>,
    #[arg(long)]
    actor: Option<Uuid>,
}

impl From<CreateArgs> for NewDeal {
    fn from(args: CreateArgs) -> Self {
        NewDeal {
            title: args.title,
            description: args.description,
            company_id: args.company,
            customer_id: args.customer,
            owner_id: args.owner,
            stage: args.stage,
            probability: args.probability,
            value_cents: args.value_cents,
            currency: args.currency,
            expected_close_date: args.expected_close,
            loss_reason: args.loss_category.zip(args.loss_notes),
        }
    }
}

#[derive(Subcommand, Debug)]
enum PipelineCommand {
    /// Open deals grouped by stage.
    Overview(FilterArgs),
    /// Count and value totals per stage.
    Stats(FilterArgs),
    Analytics {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "0m", help = "Forecast horizon such as 30d or 6m")]
        horizon: Horizon,
    },
    Forecast {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "0m")]
        horizon: Horizon,
    },
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    #[arg(long)]
    company: Option<Uuid>,
    #[arg(long)]
    owner: Option<Uuid>,
    #[arg(long, value_name = "RFC3339")]
    created_from: Option<DateTime<Utc>>,
    #[arg(long, value_name = "RFC3339")]
    created_to: Option<DateTime<Utc>>,
}

impl From<FilterArgs> for DealFilter {
    fn from(args: FilterArgs) -> Self {
        DealFilter {
            company_id: args.company,
            owner_id: args.owner,
            created_from: args.created_from,
            created_to: args.created_to,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let detail = format!("{err:#}");
            let payload = error_payload(err);
            if payload.code == "INTERNAL" {
                eprintln!("{detail}");
            }
            match serde_json::to_string(&payload) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{}: {}", payload.code, payload.message),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(ObsConfig::default().with_otlp_endpoint(config.otlp_endpoint.clone()))?;

    match cli.command {
        Command::Migrate(action) => {
            let pool = setup_pool(&config).await?;
            match action {
                MigrateCommand::Up => migrate_up(&pool).await,
                MigrateCommand::Down => migrate_down(&pool).await,
            }
        }
        Command::Deal(command) => {
            let service = pipeline_service(&config).await?;
            run_deal(&service, command).await
        }
        Command::Pipeline(command) => {
            let service = pipeline_service(&config).await?;
            run_pipeline(&service, command).await
        }
    }
}

async fn setup_pool(config: &AppConfig) -> Result<DbPool> {
    connect(&config.database)
        .await
        .context("failed to open database pool")
}

async fn pipeline_service(config: &AppConfig) -> Result<PipelineService<SeaOrmPipelineStore>> {
    let pool = setup_pool(config).await?;
    let pending = Migrator::get_pending_migrations(&pool).await?;
    if !pending.is_empty() {
        anyhow::bail!("pending migrations detected; run `pipeline-server migrate up` first");
    }
    Ok(PipelineService::new(
        SeaOrmPipelineStore::new(pool),
        config.pipeline.clone(),
    ))
}

async fn run_deal(
    service: &PipelineService<SeaOrmPipelineStore>,
    command: DealCommand,
) -> Result<()> {
    match command {
        DealCommand::Create(args) => {
            let actor = args.actor;
            let deal = service.create(args.into(), actor).await?;
            print_json(&DealView::from(&deal))
        }
        DealCommand::Advance {
            id,
            to,
            notes,
            actor,
        } => {
            let deal = service.advance(id, to, &notes, actor).await?;
            print_json(&DealView::from(&deal))
        }
        DealCommand::Win {
            id,
            create_project,
            project_name,
            actor,
        } => {
            let outcome = service
                .win(id, create_project, project_name.as_deref(), actor)
                .await?;
            print_json(&WinView::from(&outcome))
        }
        DealCommand::Lose {
            id,
            category,
            notes,
            actor,
        } => {
            let deal = service.lose(id, &category, &notes, actor).await?;
            print_json(&DealView::from(&deal))
        }
        DealCommand::Reopen { id, actor } => {
            let deal = service.reopen(id, actor).await?;
            print_json(&DealView::from(&deal))
        }
        DealCommand::Probability { id, value, actor } => {
            let deal = service.override_probability(id, value, actor).await?;
            print_json(&DealView::from(&deal))
        }
        DealCommand::History { id } => {
            let entries = service.stage_history(id).await?;
            print_json(&HistoryView {
                deal_id: id,
                entries: &entries,
            })
        }
        DealCommand::Activities { id, limit } => print_json(&service.activities(id, limit).await?),
    }
}

async fn run_pipeline(
    service: &PipelineService<SeaOrmPipelineStore>,
    command: PipelineCommand,
) -> Result<()> {
    match command {
        PipelineCommand::Overview(filter) => {
            print_json(&service.overview_for(&filter.into()).await?)
        }
        PipelineCommand::Stats(filter) => print_json(&service.stats_for(&filter.into()).await?),
        PipelineCommand::Analytics { filter, horizon } => {
            print_json(&service.analytics_for(&filter.into(), horizon).await?)
        }
        PipelineCommand::Forecast { filter, horizon } => {
            print_json(&service.forecast_for(&filter.into(), horizon).await?)
        }
    }
}

async fn migrate_up(pool: &DbPool) -> Result<()> {
    Migrator::up(pool, None).await?;
    info!("database migrations applied");
    Ok(())
}

async fn migrate_down(pool: &DbPool) -> Result<()> {
    Migrator::down(pool, Some(1)).await?;
    info!("most recent migration rolled back");
    Ok(())
}
