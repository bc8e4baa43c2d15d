//! Config validation CLI tool
//!
//! Validates a drowsed configuration file and reports any errors.

use drowse_util::{default_config_path, format_duration};
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
            eprintln!("Validates a drowsed configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match drowse_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", drowse_config::CURRENT_CONFIG_VERSION);
            println!("  Enabled: {}", policy.enabled);
            println!("  Dry run: {}", policy.dry_run);
            println!("  Check interval: {}", format_duration(policy.check_interval));
            println!("  Grace period: {}", format_duration(policy.grace_period));
            println!("  Minimum uptime: {}", format_duration(policy.min_uptime));
            println!("  Safe-shutdown tag: {}", policy.safe_shutdown_tag);
            println!(
                "  Monitored nodes: {}",
                policy
                    .monitored_nodes
                    .iter()
                    .map(|n| n.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            if !policy.excluded.is_empty() {
                println!(
                    "  Excluded: {}",
                    policy
                        .excluded
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            println!("  API: {}@{}", policy.api.user, policy.api.base_url());

            if let Some(time) = policy.shutdown_time {
                println!("  Daily shutdown: {}", time);
            }

            if !policy.stages.is_empty() {
                println!();
                println!("Shutdown order:");
                for (i, stage) in policy.stages.iter().enumerate() {
                    let ids: Vec<String> = stage.workloads.iter().map(|id| id.to_string()).collect();
                    println!(
                        "  {}. {} [{}] then wait {}",
                        i + 1,
                        stage.name,
                        ids.join(", "),
                        format_duration(stage.wait_after)
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                drowse_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                drowse_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                drowse_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                drowse_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        drowse_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
