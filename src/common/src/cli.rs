use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments shared by every granary command
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands that inspect configuration without touching any store
#[derive(Subcommand, Debug, Clone)]
pub enum CommonCommands {
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::{Configuration, LegacyBackend};
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Log level selected by the `-v`/`-q` flags, if any
    pub fn log_level(args: &CommonArgs) -> Option<&'static str> {
        if args.quiet {
            Some("warn")
        } else if args.verbose {
            Some("debug")
        } else {
            None
        }
    }

    /// Initialize logging. Explicit flags win over `RUST_LOG`, which wins over `info`.
    pub fn init_logging(args: &CommonArgs) {
        let filter = match log_level(args) {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
            return Ok(());
        }

        println!("Granary Configuration:");
        println!("======================");
        println!("Database DSN: {}", config.database.dsn);
        println!(
            "Transaction timeout: {:?}",
            config.database.transaction_timeout
        );

        match config.legacy.backend {
            LegacyBackend::Memory => println!("Legacy store: memory"),
            LegacyBackend::Sql => println!(
                "Legacy store: sql ({})",
                config.legacy.dsn.as_deref().unwrap_or("<missing dsn>")
            ),
        }
        println!("Legacy call timeout: {:?}", config.legacy.call_timeout);

        if config.storage.buckets.is_empty() {
            println!("Buckets: none");
        } else {
            let mut buckets: Vec<_> = config.storage.buckets.iter().collect();
            buckets.sort();
            for (bucket, dsn) in buckets {
                println!("Bucket {bucket}: {dsn}");
            }
        }

        println!("Cleanup fan-out: {}", config.deletion.fan_out);
        println!(
            "Object call timeout: {:?}",
            config.deletion.object_call_timeout
        );
        println!(
            "Retry: {} attempts, {:?} initial delay, {:?} max delay",
            config.deletion.retry.max_attempts,
            config.deletion.retry.initial_delay,
            config.deletion.retry.max_delay
        );
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        if config.database.dsn.is_empty() {
            anyhow::bail!("Database DSN cannot be empty");
        }
        config.validate()?;

        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Run a configuration-only command
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<()> {
        match command {
            CommonCommands::Config { json } => display_config(config, *json),
            CommonCommands::Validate => {
                validate_config(config)?;
                println!("Configuration is valid");
                Ok(())
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(())
            }
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    fn args(verbose: bool, quiet: bool) -> CommonArgs {
        CommonArgs {
            config: None,
            verbose,
            quiet,
        }
    }

    #[test]
    fn test_quiet_wins_over_verbose() {
        assert_eq!(utils::log_level(&args(true, true)), Some("warn"));
        assert_eq!(utils::log_level(&args(true, false)), Some("debug"));
        assert_eq!(utils::log_level(&args(false, false)), None);
    }

    #[test]
    fn test_validate_rejects_empty_database_dsn() {
        let mut config = Configuration::default();
        config.database.dsn.clear();

        let err = utils::validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("Database DSN cannot be empty"));
    }

    #[test]
    fn test_version_info() {
        let version = utils::version_info();
        assert!(version.contains(env!("CARGO_PKG_VERSION")));
    }
}
