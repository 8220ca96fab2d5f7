//! smsgw-network
//!
//! Netplan configuration helper invoked by the SMS Gateway web app:
//! - `get_interface` / `get_config`: report interface and netplan state
//! - `apply_config`: rewrite the netplan file and `netplan apply` it
//! - `test_connectivity`: ping gateway, DNS servers and the internet
//! - `backup_config` / `restore_config`: copy the netplan file around

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde_json::Value;

use smsgw_common::config::ToolsConfig;
use smsgw_common::exec::SystemRunner;
use smsgw_common::logging;
use smsgw_common::output::{self, ErrorKind};
use smsgw_net::{NetworkError, NetworkManager, StaticConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
enum Action {
    GetConfig,
    GetInterface,
    ApplyConfig,
    TestConnectivity,
    BackupConfig,
    RestoreConfig,
}

/// Network configuration management through netplan.
#[derive(Parser, Debug)]
#[command(name = "smsgw-network", version, about = "Network configuration management through netplan")]
struct Cli {
    /// Action to perform.
    #[arg(long, value_enum)]
    action: Action,

    /// Primary IPv4 address (apply_config).
    #[arg(long = "primary-ip", alias = "primary_ip")]
    primary_ip: Option<String>,

    /// Subnet prefix length or dotted mask (apply_config).
    #[arg(long = "subnet-mask", alias = "subnet_mask")]
    subnet_mask: Option<String>,

    /// Default gateway (apply_config).
    #[arg(long)]
    gateway: Option<String>,

    /// Primary DNS server (apply_config).
    #[arg(long = "dns-primary", alias = "dns_primary")]
    dns_primary: Option<String>,

    /// Secondary DNS server (apply_config).
    #[arg(long = "dns-secondary", alias = "dns_secondary")]
    dns_secondary: Option<String>,

    /// Secondary address, optionally with a prefix (apply_config).
    #[arg(long = "secondary-ip", alias = "secondary_ip")]
    secondary_ip: Option<String>,

    /// Backup file (backup_config / restore_config).
    #[arg(long = "backup-file", alias = "backup_file")]
    backup_file: Option<PathBuf>,

    /// Verbose logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    tracing::debug!(action = ?cli.action, "smsgw-network starting");

    match run(cli).await {
        Ok(doc) => {
            output::print_pretty(&doc);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let kind = if e.downcast_ref::<NetworkError>().is_some() {
                ErrorKind::NetworkError
            } else {
                ErrorKind::SystemError
            };
            tracing::error!(error = %e, "network action failed");
            output::print_error(kind, format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Value> {
    let config = ToolsConfig::load()?;
    let manager = NetworkManager::new(SystemRunner, config.network);

    let doc = match cli.action {
        Action::GetConfig => output::data_document(manager.current_configuration().await?),
        Action::GetInterface => output::data_document(manager.primary_interface().await?),
        Action::ApplyConfig => {
            let plan = StaticConfig::from_parts(
                cli.primary_ip,
                cli.subnet_mask,
                cli.gateway,
                cli.dns_primary,
                cli.dns_secondary,
                cli.secondary_ip,
            )?;
            manager.apply_configuration(&plan).await?
        }
        Action::TestConnectivity => output::data_document(manager.test_connectivity().await?),
        Action::BackupConfig => {
            let file = cli.backup_file.ok_or(NetworkError::BackupFileRequired)?;
            manager.backup_configuration(&file)
        }
        Action::RestoreConfig => {
            let file = cli.backup_file.ok_or(NetworkError::BackupFileRequired)?;
            manager.restore_configuration(&file).await
        }
    };
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_php_spelling() {
        let cli = Cli::try_parse_from([
            "smsgw-network",
            "--action",
            "apply_config",
            "--primary_ip",
            "192.168.1.10",
            "--subnet-mask",
            "24",
            "--dns_secondary",
            "8.8.4.4",
        ])
        .unwrap();
        assert_eq!(cli.action, Action::ApplyConfig);
        assert_eq!(cli.primary_ip.as_deref(), Some("192.168.1.10"));
        assert_eq!(cli.subnet_mask.as_deref(), Some("24"));
        assert_eq!(cli.dns_secondary.as_deref(), Some("8.8.4.4"));
    }

    #[test]
    fn unknown_action_rejected() {
        assert!(Cli::try_parse_from(["smsgw-network", "--action", "reboot"]).is_err());
        assert!(Cli::try_parse_from(["smsgw-network"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
