mod config;
mod plan_cmds;
mod questions_cmd;

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use mealplan_core::MealPlanService;
use mealplan_core::identity::IdentityResolver;
use mealplan_core::store::PgStore;
use mealplan_core::token::TokenAuthenticator;
use mealplan_db::pool;

use config::MealplanConfig;

#[derive(Parser)]
#[command(name = "mealplan", about = "Meal-plan lifecycle operator tool")]
struct Cli {
    /// Database URL (overrides MEALPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a mealplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/mealplan")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the mealplan database (requires config file or env vars)
    DbInit,
    /// Print the questionnaire for a category
    Questions {
        /// diabetes, hbp, weight or detox (aliases accepted)
        category: String,
    },
    /// Inspect meal plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Show one meal plan with its schedules and payment
    Show {
        /// Meal plan ID
        plan_id: i64,
        /// Print the stored plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every meal plan of an identity, newest first
    List {
        #[command(flatten)]
        identity: IdentityArgs,
    },
    /// Show the newest meal plan of an identity in a category
    Latest {
        #[command(flatten)]
        identity: IdentityArgs,
        /// diabetes, hbp, weight or detox
        #[arg(long)]
        category: String,
    },
}

/// Who to look up: a guest email or a bearer credential.
#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct IdentityArgs {
    /// Guest email
    email: Option<String>,
    /// Credential issued by the authentication provider
    #[arg(long)]
    token: Option<String>,
}

/// Execute the `mealplan init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let token_secret = config::generate_token_secret();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
            max_connections: None,
            acquire_timeout_secs: None,
        },
        auth: config::AuthSection {
            token_secret: token_secret.clone(),
        },
        engine: Default::default(),
        catalog: Default::default(),
    };

    config::save_config(&cfg)?;
    info!(path = %path.display(), overwritten = force, "config file written");

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  auth.token_secret = {}...{}", &token_secret[..8], &token_secret[56..]);
    println!();
    println!("Next: run `mealplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `mealplan db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = MealplanConfig::resolve(cli_db_url)?;

    println!("Initializing mealplan database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    info!(
        database = resolved.db_config.database_name().unwrap_or("?"),
        source = %resolved.url_source,
        tables = counts.len(),
        "database initialized"
    );
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("mealplan db-init complete.");
    Ok(())
}

/// Build the service over PostgreSQL with credential verification enabled.
fn build_service(
    resolved: MealplanConfig,
    db_pool: sqlx::PgPool,
) -> anyhow::Result<MealPlanService> {
    let authenticator = TokenAuthenticator::new(resolved.token_config);
    let service = MealPlanService::builtin(
        IdentityResolver::new(Arc::new(authenticator)),
        Arc::new(PgStore::new(db_pool)),
        resolved.engine,
        resolved.catalog,
    )?;
    Ok(service)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is reserved for command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Questions { category } => {
            questions_cmd::run_questions(&category)?;
        }
        Commands::Plan { command } => {
            let resolved = MealplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match build_service(resolved, db_pool.clone()) {
                Ok(service) => plan_cmds::run_plan_command(command, &service).await,
                Err(e) => Err(e),
            };
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
