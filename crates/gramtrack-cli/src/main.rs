use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gramtrack-cli")]
#[command(about = "gramtrack command line interface")]
struct Cli {
    /// Base URL of a running gramtrack API (for the HTTP commands).
    #[arg(long, env = "GRAMTRACK_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register or refresh a tracking via the running API
    Track {
        /// Account handle to track
        username: String,

        /// Source platform (instagram or twitter)
        #[arg(long, default_value = "instagram")]
        platform: String,

        /// Open a tracking session under this identifier
        #[arg(long)]
        tracking_id: Option<String>,

        /// Owning end-user id
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Scheduler commands against the running API
    Cron {
        #[command(subcommand)]
        command: CronCommands,
    },
    /// Queue diagnostics against the running API
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Materialize today's daily metrics from history (direct DB access)
    Analytics {
        #[command(subcommand)]
        command: AnalyticsCommands,
    },
    /// Database management commands
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum CronCommands {
    /// Enqueue a tracking job for every profile, like the daily tick.
    /// Suitable as an external scheduled invocation: the long-lived API
    /// process owns queue processing; this command enqueues and exits.
    Trigger,
    /// Show configured schedules and next firing times
    Schedule,
}

#[derive(Debug, Subcommand)]
enum QueueCommands {
    /// Show queue size, in-flight job, spacing, and backoff state
    Status,
    /// Kick the dispatcher
    Process,
}

#[derive(Debug, Subcommand)]
enum AnalyticsCommands {
    /// Refresh today's daily-metric rows for all profiles
    Refresh,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Test the database connection
    Ping,
    /// Run pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        let level = std::env::var("GRAMTRACK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(level)
    })?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Track {
            username,
            platform,
            tracking_id,
            user_id,
        }) => run_track(&cli.api_url, &username, &platform, tracking_id, user_id).await?,
        Some(Commands::Cron { command }) => match command {
            CronCommands::Trigger => run_post(&cli.api_url, "/cron/trigger").await?,
            CronCommands::Schedule => run_get(&cli.api_url, "/cron/schedule").await?,
        },
        Some(Commands::Queue { command }) => match command {
            QueueCommands::Status => run_get(&cli.api_url, "/queue/status").await?,
            QueueCommands::Process => run_post(&cli.api_url, "/queue/process").await?,
        },
        Some(Commands::Analytics { command }) => match command {
            AnalyticsCommands::Refresh => run_analytics_refresh().await?,
        },
        Some(Commands::Db { command }) => match command {
            DbCommands::Ping => run_db_ping().await?,
            DbCommands::Migrate => run_db_migrate().await?,
        },
        None => println!("gramtrack-cli: see --help for commands"),
    }

    Ok(())
}

async fn run_track(
    api_url: &str,
    username: &str,
    platform: &str,
    tracking_id: Option<String>,
    user_id: Option<String>,
) -> anyhow::Result<()> {
    let body = serde_json::json!({
        "username": username,
        "platform": platform,
        "tracking_id": tracking_id,
        "user_id": user_id,
    });
    let response = reqwest::Client::new()
        .post(format!("{}/profiles", api_url.trim_end_matches('/')))
        .json(&body)
        .send()
        .await?;
    print_api_response(response).await
}

async fn run_get(api_url: &str, path: &str) -> anyhow::Result<()> {
    let response = reqwest::Client::new()
        .get(format!("{}{path}", api_url.trim_end_matches('/')))
        .send()
        .await?;
    print_api_response(response).await
}

async fn run_post(api_url: &str, path: &str) -> anyhow::Result<()> {
    let response = reqwest::Client::new()
        .post(format!("{}{path}", api_url.trim_end_matches('/')))
        .send()
        .await?;
    print_api_response(response).await
}

async fn print_api_response(response: reqwest::Response) -> anyhow::Result<()> {
    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        anyhow::bail!("API returned {status}");
    }
    Ok(())
}

async fn run_analytics_refresh() -> anyhow::Result<()> {
    let config = load_config_or_exit();
    let pool = connect_or_exit().await;
    let refreshed = gramtrack_engine::refresh_daily_metrics(&pool, config.timezone).await?;
    println!("refreshed daily metrics for {refreshed} profile(s)");
    Ok(())
}

async fn run_db_ping() -> anyhow::Result<()> {
    let pool = connect_or_exit().await;
    gramtrack_db::ping(&pool).await?;
    println!("database is healthy");
    Ok(())
}

async fn run_db_migrate() -> anyhow::Result<()> {
    let pool = connect_or_exit().await;
    let applied = gramtrack_db::run_migrations(&pool).await?;
    if applied == 0 {
        println!("0 pending migrations — database is up to date");
    } else {
        println!("applied {applied} migration(s) successfully");
    }
    Ok(())
}

fn load_config_or_exit() -> gramtrack_core::AppConfig {
    gramtrack_core::load_app_config().unwrap_or_else(|e| {
        eprintln!("error: invalid configuration: {e}");
        std::process::exit(1);
    })
}

async fn connect_or_exit() -> sqlx::PgPool {
    gramtrack_db::connect_pool_from_env().await.unwrap_or_else(|e| {
        match &e {
            gramtrack_db::DbError::MissingDatabaseUrl => {
                eprintln!("error: DATABASE_URL is not set");
                eprintln!("hint: copy .env.example to .env and set DATABASE_URL");
            }
            gramtrack_db::DbError::Sqlx(sql_err) => {
                eprintln!("error: failed to connect to database: {sql_err}");
                eprintln!("hint: ensure postgres is running");
            }
            other => eprintln!("error: failed to connect to database: {other}"),
        }
        std::process::exit(1);
    })
}

#[cfg(test)]
mod tests;
