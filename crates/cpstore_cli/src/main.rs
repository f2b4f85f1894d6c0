//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open the store from `CPSTORE_*` settings and run the health check.
//! - Keep output deterministic for quick local sanity checks.

use cpstore_core::{default_log_level, init_logging, DbClient, StoreConfig};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

const ENV_LOG_DIR: &str = "CPSTORE_LOG_DIR";

fn main() -> ExitCode {
    println!("cpstore_core version={}", cpstore_core::core_version());

    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::from(2);
        }
    };

    if let Ok(dir) = std::env::var(ENV_LOG_DIR) {
        let level = config
            .log_level
            .clone()
            .unwrap_or_else(|| default_log_level().to_string());
        if let Err(err) = init_logging(&level, &PathBuf::from(dir)) {
            eprintln!("logging disabled: {err}");
        }
    }

    let client = match config.open_client() {
        Ok(client) => client,
        Err(err) => {
            error!("event=cli_health module=cli status=error error={err}");
            println!("cpstore health=error open={err}");
            return ExitCode::FAILURE;
        }
    };

    match client.db_connection_test() {
        Ok(()) => {
            println!(
                "cpstore health=ok storage={} locks={}",
                config
                    .db_path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| ":memory:".to_string()),
                client.lock_client().is_some()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_health module=cli status=error error={err}");
            println!("cpstore health=error read={err}");
            ExitCode::FAILURE
        }
    }
}
