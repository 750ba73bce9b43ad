//! Command line interface.

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};

/// Parsed command line arguments.
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: bool,
    /// Suppress the interactive console; shutdown comes from signals only.
    pub headless: bool,
}

impl CliArgs {
    pub fn parse() -> Self {
        let matches = Command::new("Quarry Game Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Multiplayer sandbox game server with a plugin-driven core")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("quarry.toml"),
            )
            .arg(
                Arg::new("bind")
                    .short('b')
                    .long("bind")
                    .value_name("ADDRESS")
                    .help("Bind address (e.g., 0.0.0.0:25600)"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("headless")
                    .long("headless")
                    .help("Disable the interactive console")
                    .action(ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .expect("config has a default value"),
            ),
            bind_address: matches.get_one::<String>("bind").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            headless: matches.get_flag("headless"),
        }
    }
}
