use clap::{Parser, Subcommand};
use sentinel_domain::config::Config;

/// Sentinel — a CaMeL-pattern task execution gateway.
#[derive(Debug, Parser)]
#[command(name = "sentinel", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run as an MCP server over stdio (fixed tool surface, no HTTP).
    Mcp,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("SENTINEL_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = Config::load(Some(&config_path))
        .map_err(|e| anyhow::anyhow!("loading {config_path}: {e}"))?;
    Ok((config, config_path))
}

pub fn validate(config: &Config, config_path: &str) -> bool {
    use sentinel_domain::config::ConfigSeverity;

    let issues = config.validate();
    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();
    let warning_count = issues.len() - error_count;
    for issue in &issues {
        println!("{issue}");
    }
    println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");
    error_count == 0
}

pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}
