//! Config validation CLI tool
//!
//! Validates a plugwatchd configuration file and reports any errors.

use plugwatch_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a plugwatchd configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match plugwatch_config::load_config(&config_path) {
        Ok(settings) => {
            let r = &settings.reconciler;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", plugwatch_config::CURRENT_CONFIG_VERSION);
            println!("  Data dir: {}", settings.daemon.data_dir.display());
            println!("  Tick interval: {}s", r.tick_interval.as_secs());
            println!("  Startup delay: {}s", r.startup_delay.as_secs());
            println!("  Unplug threshold: {}s", r.unplug_threshold.as_secs());
            println!("  Store timeout: {}ms", r.store_timeout.as_millis());
            println!("  Max concurrent devices: {}", r.max_concurrent_devices);
            println!("  Debounce: {}s", r.debounce.as_secs());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                plugwatch_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                plugwatch_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                plugwatch_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                plugwatch_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        plugwatch_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
