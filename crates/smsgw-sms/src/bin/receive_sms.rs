//! smsgw-receive-sms
//!
//! Collects incoming SMS from every ready modem into the `received_sms`
//! table, once or as a polling daemon.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgGroup, CommandFactory, Parser};

use smsgw_common::config::ToolsConfig;
use smsgw_common::exec::SystemRunner;
use smsgw_common::logging;
use smsgw_common::output::{self, ErrorKind};
use smsgw_sms::store;
use smsgw_sms::{CycleReport, ModemClient, ModemInfo, MySqlStore, ReceiveError, SmsReceiver};

/// Receive SMS through mmcli (ModemManager).
#[derive(Parser, Debug)]
#[command(
    name = "smsgw-receive-sms",
    version,
    about = "Receive SMS through mmcli (ModemManager)",
    after_help = "Examples:\n  smsgw-receive-sms --check-once\n  smsgw-receive-sms --daemon --interval 30\n  smsgw-receive-sms --list-modems",
    group(ArgGroup::new("mode").args(["check_once", "daemon", "list_modems"]))
)]
struct Cli {
    /// Check for received SMS once.
    #[arg(long = "check-once", alias = "check_once", default_value_t = false)]
    check_once: bool,

    /// Keep checking until interrupted.
    #[arg(long, default_value_t = false)]
    daemon: bool,

    /// Seconds between checks in daemon mode.
    #[arg(long, requires = "daemon")]
    interval: Option<u64>,

    /// List available modems.
    #[arg(long = "list-modems", alias = "list_modems", default_value_t = false)]
    list_modems: bool,

    /// Print results as JSON.
    #[arg(long = "json-output", alias = "json_output", default_value_t = false)]
    json_output: bool,

    /// Verbose logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let json = cli.json_output;

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let kind = if e.downcast_ref::<ReceiveError>().is_some() {
                ErrorKind::SmsReceiveError
            } else {
                ErrorKind::SystemError
            };
            if json {
                output::print_error(kind, format!("{e:#}"));
            } else {
                tracing::error!(error_type = %kind, "{e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = ToolsConfig::load()?;
    let client = ModemClient::new(SystemRunner, config.sms.clone());

    if cli.list_modems {
        let modems = client.find_modems().await.map_err(ReceiveError::from)?;
        let modems: Vec<ModemInfo> = modems.into_iter().filter(|m| m.device_path.is_some()).collect();
        if cli.json_output {
            output::print_pretty(&serde_json::json!({ "modems": modems }));
        } else {
            print_modems(&modems);
        }
        return Ok(ExitCode::SUCCESS);
    }

    if !cli.check_once && !cli.daemon {
        Cli::command().print_help().context("cannot print help")?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut database = config.database.clone();
    database
        .apply_env_file(&config.sms.env_file)
        .map_err(ReceiveError::from)?;
    let window = chrono::TimeDelta::try_minutes(config.sms.dedup_window_minutes)
        .context("dedup_window_minutes out of range")?;
    let store = match std::env::var("DATABASE_URL") {
        Ok(url) => MySqlStore::connect(&url, window).await?,
        Err(_) => MySqlStore::connect_with(store::connect_options(&database), window).await?,
    };
    let mut receiver = SmsReceiver::new(client, store);

    let code = if cli.daemon {
        let interval = Duration::from_secs(cli.interval.unwrap_or(config.sms.daemon_interval_secs));
        receiver
            .run_daemon(interval, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "cannot listen for SIGINT");
                    std::future::pending::<()>().await;
                }
            })
            .await;
        ExitCode::SUCCESS
    } else {
        let report = receiver.run_cycle().await;
        if cli.json_output {
            output::print_pretty(&report);
        } else {
            print_report(&report);
        }
        if report.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    };

    receiver.store().close().await;
    Ok(code)
}

fn print_modems(modems: &[ModemInfo]) {
    println!("Available modems:");
    for m in modems {
        println!("  ID: {}", m.id);
        println!("  Device: {}", m.device_path.as_deref().unwrap_or("N/A"));
        match m.status {
            Some(status) => println!("  Status: {status}"),
            None => println!("  Status: N/A"),
        }
        println!();
    }
}

fn print_report(report: &CycleReport) {
    match report {
        CycleReport::Completed {
            processed, modems, ..
        } => println!("SMS check completed: {processed} SMS processed from {modems} active modems"),
        CycleReport::Failed { error } => println!("Error: {error}"),
    }
}
