//! # Command Line Interface
//!
//! Flags for the `secretops` binary. Flags override the environment.

use crate::config::AppConfig;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "secretops")]
#[command(about = "Secret lifecycle service for the trading backend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// API bind host override
    #[arg(long)]
    pub host: Option<String>,

    /// API bind port override
    #[arg(long)]
    pub port: Option<u16>,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.api.host = host.clone();
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_environment() {
        let cli = Cli::try_parse_from(["secretops", "--host", "127.0.0.1", "--port", "9000"]).unwrap();
        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.api.bind_address(), "127.0.0.1:9000");
        assert!(!cli.check_config);
    }

    #[test]
    fn check_config_flag() {
        let cli = Cli::try_parse_from(["secretops", "--check-config"]).unwrap();
        assert!(cli.check_config);
        assert!(cli.port.is_none());
    }
}
