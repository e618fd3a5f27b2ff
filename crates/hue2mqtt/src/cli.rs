use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "hue2mqtt",
    version,
    about = "Bidirectional bridge between a Hue-compatible hub and an MQTT broker"
)]
pub struct Cli {
    /// Path to the configuration file (default: ./hue2mqtt.toml,
    /// then /etc/hue2mqtt.toml).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Register a new application key with the hub at HOST and exit.
    /// Press the hub's link button first.
    #[arg(long, value_name = "HOST")]
    pub discover: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn discover_takes_a_host() {
        let cli = Cli::parse_from(["hue2mqtt", "--discover", "192.168.0.2"]);
        assert_eq!(cli.discover.as_deref(), Some("192.168.0.2"));
    }
}
