//! smsgw-ssl
//!
//! HTTPS certificate helper invoked by the SMS Gateway web app:
//! - `generate`: self-signed certificate for the gateway
//! - `upload`: validate and install a custom certificate/key pair
//! - `get_info`: details of the certificate nginx serves
//! - `backup` / `restore` / `list_backups`: certificate snapshots
//! - `update_nginx`: write the HTTPS site and reload nginx

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde_json::{json, Value};

use smsgw_common::config::ToolsConfig;
use smsgw_common::exec::SystemRunner;
use smsgw_common::logging;
use smsgw_common::output::{self, ErrorKind};
use smsgw_tls::{CertificateManager, CertificateSubject, SslError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
enum Action {
    Generate,
    Upload,
    GetInfo,
    Backup,
    Restore,
    UpdateNginx,
    ListBackups,
    ReloadNginx,
}

/// SSL certificate management for the gateway's nginx site.
#[derive(Parser, Debug)]
#[command(name = "smsgw-ssl", version, about = "SSL certificate management for the gateway's nginx site")]
struct Cli {
    /// Action to perform.
    #[arg(long, value_enum)]
    action: Action,

    /// Validity in days (generate).
    #[arg(long, default_value_t = 3650)]
    days: u32,

    /// Country code (generate).
    #[arg(long, default_value = "MA")]
    country: String,

    /// State or province (generate).
    #[arg(long, default_value = "Casablanca")]
    state: String,

    /// City (generate).
    #[arg(long, default_value = "Casablanca")]
    city: String,

    /// Organization (generate).
    #[arg(long, default_value = "SMS Gateway")]
    organization: String,

    /// Common name (generate).
    #[arg(long = "common-name", alias = "common_name", default_value = "localhost")]
    common_name: String,

    /// PEM certificate to install (upload).
    #[arg(long = "cert-file", alias = "cert_file")]
    cert_file: Option<PathBuf>,

    /// PEM private key to install (upload).
    #[arg(long = "key-file", alias = "key_file")]
    key_file: Option<PathBuf>,

    /// Backup directory to restore instead of the latest one (restore).
    #[arg(long = "backup-dir", alias = "backup_dir")]
    backup_dir: Option<PathBuf>,

    /// Verbose logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Cli {
    fn subject(&self) -> CertificateSubject {
        CertificateSubject {
            days: self.days,
            country: self.country.clone(),
            state: self.state.clone(),
            city: self.city.clone(),
            organization: self.organization.clone(),
            common_name: self.common_name.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    tracing::debug!(action = ?cli.action, "smsgw-ssl starting");

    match run(cli).await {
        Ok(doc) => {
            output::print_pretty(&doc);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let kind = if e.downcast_ref::<SslError>().is_some() {
                ErrorKind::SslError
            } else {
                ErrorKind::SystemError
            };
            tracing::error!(error = %e, "ssl action failed");
            output::print_error(kind, format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Value> {
    let config = ToolsConfig::load()?;
    let manager = CertificateManager::new(SystemRunner, config.ssl);
    manager.ensure_directories()?;

    let doc = match cli.action {
        Action::Generate => manager.generate(&cli.subject()).await?,
        Action::Upload => {
            let (Some(cert_file), Some(key_file)) = (&cli.cert_file, &cli.key_file) else {
                return Err(SslError::MissingUploadFiles.into());
            };
            let cert = read_pem(cert_file)?;
            let key = read_pem(key_file)?;
            manager.upload(&cert, &key).await?
        }
        Action::GetInfo => output::data_document(manager.current_info().await),
        Action::Backup => manager.backup(),
        Action::Restore => manager.restore(cli.backup_dir.as_deref()).await,
        Action::UpdateNginx => manager.update_nginx().await,
        Action::ListBackups => json!({
            "success": true,
            "backups": manager.list_backups()?,
        }),
        Action::ReloadNginx => {
            manager.reload_nginx().await?;
            json!({
                "success": true,
                "message": "nginx reloaded",
            })
        }
    };
    Ok(doc)
}

fn read_pem(path: &std::path::Path) -> Result<String, SslError> {
    std::fs::read_to_string(path).map_err(|source| SslError::Io {
        context: format!("cannot read {}", path.display()),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_defaults() {
        let cli = Cli::try_parse_from(["smsgw-ssl", "--action", "generate"]).unwrap();
        assert_eq!(cli.action, Action::Generate);
        assert_eq!(cli.subject(), CertificateSubject::default());
    }

    #[test]
    fn php_spelling_accepted() {
        let cli = Cli::try_parse_from([
            "smsgw-ssl",
            "--action",
            "upload",
            "--cert_file",
            "/tmp/site.crt",
            "--key-file",
            "/tmp/site.key",
        ])
        .unwrap();
        assert_eq!(cli.action, Action::Upload);
        assert_eq!(cli.cert_file, Some(PathBuf::from("/tmp/site.crt")));
        assert_eq!(cli.key_file, Some(PathBuf::from("/tmp/site.key")));

        let cli = Cli::try_parse_from([
            "smsgw-ssl",
            "--action",
            "generate",
            "--common_name",
            "gw.example.ma",
            "--days",
            "365",
        ])
        .unwrap();
        assert_eq!(cli.subject().common_name, "gw.example.ma");
        assert_eq!(cli.subject().days, 365);
    }

    #[test]
    fn actions_use_snake_case() {
        for (name, action) in [
            ("get_info", Action::GetInfo),
            ("update_nginx", Action::UpdateNginx),
            ("list_backups", Action::ListBackups),
        ] {
            let cli = Cli::try_parse_from(["smsgw-ssl", "--action", name]).unwrap();
            assert_eq!(cli.action, action);
        }
        assert!(Cli::try_parse_from(["smsgw-ssl", "--action", "get-info"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
