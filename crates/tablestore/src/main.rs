use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tablestore::provision;
use tablestore::storage::dynamodb::{AwsConfig, DynamoDbStore};
use tablestore::Config;
use tablestore_core::storage::Store;

/// tablestore - Manage the shared single-table layout
#[derive(Parser, Debug)]
#[command(name = "tablestore")]
#[command(version, about, long_about = "Create or delete the tablestore DynamoDB table.

Environment variables:
  AWS_ENDPOINT_URL       - Use local DynamoDB (e.g., http://localhost:8000)
  AWS_REGION             - AWS region (defaults to us-east-1)
  TABLESTORE_TABLE_NAME  - Table name (defaults to tablestore)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Create the table with its five local secondary indexes and TTL.
    CreateTable {
        /// Table name to use.
        #[arg(long, env = "TABLESTORE_TABLE_NAME", default_value = "tablestore")]
        table_name: String,

        /// Succeed if the table already exists.
        #[arg(long)]
        if_not_exists: bool,
    },

    /// Delete the table and every row in it.
    DeleteTable {
        /// Table name to use.
        #[arg(long, env = "TABLESTORE_TABLE_NAME", default_value = "tablestore")]
        table_name: String,

        /// Succeed if the table does not exist.
        #[arg(long)]
        if_exists: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablestore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let aws = AwsConfig::default();
    tracing::info!("Target: {}", aws.target_display());
    let store: Arc<dyn Store> = Arc::new(DynamoDbStore::from_config(&aws).await);

    match cli.command {
        Command::CreateTable {
            table_name,
            if_not_exists,
        } => {
            let config = Config::from_env().with_table_name(table_name);
            let schema = provision::table_schema(&config.table_name);
            if provision::create_table(store.as_ref(), &schema, if_not_exists).await? {
                tracing::info!(table = %config.table_name, "Created table");
            }
        }
        Command::DeleteTable {
            table_name,
            if_exists,
        } => {
            if provision::delete_table(store.as_ref(), &table_name, if_exists).await? {
                tracing::info!(table = %table_name, "Deleted table");
            }
        }
    }

    Ok(())
}
