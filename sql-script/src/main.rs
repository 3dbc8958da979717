mod args;

use std::fs::File;
use std::io::BufReader;

use clap::Parser;
use sql_tasks::prelude::*;
use tracing::Level;

use crate::args::{Args, RunConfig};

fn main() {
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .init();

    let config = RunConfig::from_args(args);
    let config_json = serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string());
    tracing::info!("config: {}", config_json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| {
            eprintln!("failed to start runtime: {err}");
            std::process::exit(1);
        });

    match runtime.block_on(run(config)) {
        Ok(executed) => tracing::info!(executed, "script finished"),
        Err(err) => {
            tracing::error!(error = %err, "script failed");
            std::process::exit(1);
        }
    }
}

async fn run(config: RunConfig) -> Result<usize, SqlTaskError> {
    let pool = SqlitePool::builder(config.db.as_str())
        .pool_size(1, 1)?
        .build()
        .await?;
    let input = BufReader::new(File::open(&config.script)?);

    // Acquiring blocks on the pool, so the whole run stays off the runtime workers.
    tokio::task::spawn_blocking(move || {
        let mut runner = ScriptRunner::new(pool.acquire()?, input)
            .delimiter(config.delimiter)?
            .encoding(config.encoding)
            .trim_statements(config.trim_statements)
            .log_statements(config.log_statements)
            .replacements(config.replacements);
        let executed = runner.run_script();
        pool.close();
        executed
    })
    .await
    .map_err(|err| SqlTaskError::ExecutionError(format!("script worker failed: {err}")))?
}
