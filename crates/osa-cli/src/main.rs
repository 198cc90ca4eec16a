use anyhow::Result;
use clap::{Parser, Subcommand};

use osa_daemon::wiring::HANDLER_REGISTRY;
use osa_db::PgOutbox;
use osa_pipeline::SubscriptionRegistry;

#[derive(Parser)]
#[command(name = "osa")]
#[command(about = "OSA administrative CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overlay -> ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Per-consumer-group pending delivery counts
    Queues,

    /// Operate on parked deliveries
    Deliveries {
        #[command(subcommand)]
        cmd: DeliveriesCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum DeliveriesCmd {
    /// List event ids parked as failed for a consumer group.
    ListFailed {
        #[arg(long)]
        group: String,
    },

    /// Return a group's failed deliveries to pending with a fresh retry
    /// budget.
    RetryFailed {
        #[arg(long)]
        group: String,
    },

    /// Drop delivered rows older than the retention window.
    Prune {
        #[arg(long, default_value_t = 30)]
        retention_days: i64,
    },
}

fn outbox(pool: sqlx::PgPool) -> PgOutbox {
    PgOutbox::new(
        pool,
        SubscriptionRegistry::from_pairs(HANDLER_REGISTRY.iter().copied()),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = osa_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let status = osa_db::status(&pool).await?;
                    println!(
                        "db_ok={} migrated={}",
                        status.ok, status.has_deliveries_table
                    );
                }
                DbCmd::Migrate => {
                    osa_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
            let loaded = osa_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Queues => {
            let pool = osa_db::connect_from_env().await?;
            let depths = outbox(pool).queue_depths().await?;
            if depths.is_empty() {
                println!("no pending deliveries");
            }
            for depth in depths {
                println!("{}\t{}", depth.consumer_group, depth.pending);
            }
        }

        Commands::Deliveries { cmd } => {
            let pool = osa_db::connect_from_env().await?;
            let outbox = outbox(pool);
            match cmd {
                DeliveriesCmd::ListFailed { group } => {
                    let failed = outbox.list_failed(&group).await?;
                    if failed.is_empty() {
                        println!("no failed deliveries for {group}");
                    }
                    for event_id in failed {
                        println!("{event_id}");
                    }
                }
                DeliveriesCmd::RetryFailed { group } => {
                    let count = outbox.retry_failed(&group).await?;
                    println!("requeued={count}");
                }
                DeliveriesCmd::Prune { retention_days } => {
                    let retention = chrono::Duration::days(retention_days);
                    let count = outbox.prune_delivered(retention, chrono::Utc::now()).await?;
                    println!("pruned={count}");
                }
            }
        }
    }

    Ok(())
}
