use std::{process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use common::utils::logging::{init_logging, LogFormat};
use dotenvy::dotenv;
use service::premium::{PremiumDatabase, PremiumSettings, PremiumStore};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "premium")]
#[command(about = "Inspect and manage premium/demo subscriptions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show the current status of a user (expires it lazily)")]
    Status { user_id: i64 },
    #[command(about = "Print the raw stored record")]
    Info { user_id: i64 },
    #[command(about = "Grant a full subscription starting now")]
    Add {
        user_id: i64,
        #[arg(short, long)]
        transaction_id: Option<String>,
        #[arg(short, long)]
        days: Option<i64>,
    },
    #[command(about = "Extend a subscription by a number of days")]
    Extend { user_id: i64, days: i64 },
    #[command(about = "Activate the one-time demo for a user")]
    Demo { user_id: i64 },
    #[command(about = "Print aggregate counters")]
    Stats,
    #[command(about = "Mark every past-due subscription as expired")]
    Cleanup,
    #[command(about = "List subscriptions ending soon")]
    Expiring {
        #[arg(short, long)]
        days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env first so CONFIG_PATH / RUST_LOG / PREMIUM_DATA_FILE apply
    dotenv().ok();
    let cli = Cli::parse();

    let cfg = match configs::AppConfig::load_and_validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            init_logging(LogFormat::Compact);
            error!(service = "premium", event = "config_invalid", error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    init_logging(LogFormat::from_config(&cfg.logging.format));
    info!(service = "premium", event = "logger_init", "tracing subscriber initialized");

    let settings = PremiumSettings {
        data_file: cfg.premium.data_file.clone().into(),
        default_duration_days: cfg.premium.default_duration_days,
        demo_duration_days: cfg.premium.demo_duration_days,
        expiring_soon_days: cfg.premium.expiring_soon_days,
    };
    if let Err(e) = common::env::ensure_data_dir(&settings.data_file).await {
        error!(service = "premium", event = "data_dir_failed", error = %e, "cannot prepare data directory");
        return ExitCode::FAILURE;
    }

    let store: Arc<dyn PremiumStore> = PremiumDatabase::open(settings).await;
    match run(store.as_ref(), cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(service = "premium", event = "run_failed", error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(store: &dyn PremiumStore, command: Commands) -> anyhow::Result<bool> {
    let ok = match command {
        Commands::Status { user_id } => {
            let status = store.check_premium_status(user_id).await;
            println!("{user_id}: premium={} status={status}", status.is_premium());
            true
        }
        Commands::Info { user_id } => match store.get_user_info(user_id).await {
            Some(record) => {
                println!("{}", serde_json::to_string_pretty(&record)?);
                true
            }
            None => {
                println!("{user_id}: no record");
                false
            }
        },
        Commands::Add { user_id, transaction_id, days } => {
            store.add_premium_user(user_id, transaction_id, days).await
        }
        Commands::Extend { user_id, days } => store.extend_premium(user_id, days).await,
        Commands::Demo { user_id } => {
            let (ok, message) = store.activate_demo(user_id).await;
            println!("{message}");
            ok
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&store.get_stats().await)?);
            true
        }
        Commands::Cleanup => {
            println!("cleaned: {}", store.cleanup_expired().await);
            true
        }
        Commands::Expiring { days } => {
            println!("{}", serde_json::to_string_pretty(&store.get_expiring_soon(days).await)?);
            true
        }
    };
    Ok(ok)
}
