//! mongo-resolver command line
//!
//! Resolves one shell-style query against the configured deployment and
//! prints the result as JSON.
//!
//! # Usage
//!
//! ```bash
//! mongo-resolver 'db.users.find({"age":{"$gt":30}}).limit(2)'
//! mongo-resolver --update 'db.users.insert({"name":"Ann"})'
//! mongo-resolver --url mongodb://localhost:27017 --database shop 'orders.aggregate([])'
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::runtime::Handle;

use mongo_resolver::config::Settings;
use mongo_resolver::connection::ConnectionProvider;
use mongo_resolver::controller::{MongoPersistenceController, PersistenceController};
use mongo_resolver::error::{ConfigError, ResolverError, Result};
use mongo_resolver::logging;
use mongo_resolver::parser::{CallParser, ParsedQuery};

/// Resolve MongoDB shell-style queries
#[derive(Parser, Debug)]
#[command(name = "mongo-resolver", version, about = "Resolve MongoDB shell-style queries")]
struct CliArgs {
    /// Shell-style query, e.g. db.users.find({"name":"Ann"})
    #[arg(value_name = "QUERY")]
    query: String,

    /// Configuration file (defaults to ~/.mongo-resolver/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Connection URI, overriding the configured one
    #[arg(long, value_name = "URI")]
    url: Option<String>,

    /// Default database, overriding the configured one
    #[arg(short, long, value_name = "NAME")]
    database: Option<String>,

    /// Print an operation result (implied for insert, update and remove)
    #[arg(short, long)]
    update: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = CliArgs::parse();
    let settings = load_settings(&args)?;
    logging::init(&settings.logging);

    let handle = Handle::current();
    let provider = ConnectionProvider::new();
    let controller = MongoPersistenceController::init(&provider, &settings, &handle).await?;

    let outcome = execute(&controller, &args, &handle).await;
    controller.close(&handle).await?;

    println!("{}", outcome?);
    Ok(())
}

/// Run the query and render its result
async fn execute(
    controller: &dyn PersistenceController,
    args: &CliArgs,
    handle: &Handle,
) -> Result<String> {
    let rendered = if args.update || is_write(&args.query) {
        let result = controller.update(&args.query, handle).await?;
        serde_json::to_string_pretty(&result)
    } else {
        let value = controller.query(&args.query, handle).await?;
        serde_json::to_string_pretty(&value)
    };
    rendered.map_err(|e| ResolverError::Codec(e.to_string()))
}

/// Whether the query is a structured call to a writing operation
fn is_write(query: &str) -> bool {
    matches!(CallParser::parse(query), Ok(ParsedQuery::Call(call)) if call.operation.is_write())
}

/// Load settings from the given or default file and apply overrides
///
/// A missing default file is not an error; a missing explicit one is.
fn load_settings(args: &CliArgs) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => match Settings::from_file(Settings::default_path()) {
            Ok(settings) => settings,
            Err(ResolverError::Config(ConfigError::FileNotFound(_))) => Settings::default(),
            Err(e) => return Err(e),
        },
    };

    if let Some(url) = &args.url {
        settings.persistence.url = Some(url.clone());
    }
    if let Some(database) = &args.database {
        settings.persistence.database = Some(database.clone());
    }
    if args.verbose {
        settings.logging.level = mongo_resolver::config::LogLevel::Debug;
    }

    settings.persistence.validate()?;
    Ok(settings)
}
