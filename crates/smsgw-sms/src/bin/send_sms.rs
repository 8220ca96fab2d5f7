//! smsgw-send-sms
//!
//! Sends one SMS through ModemManager, or lists the available modems.

use std::process::ExitCode;

use clap::Parser;

use smsgw_common::config::ToolsConfig;
use smsgw_common::exec::SystemRunner;
use smsgw_common::logging;
use smsgw_common::output::{self, ErrorKind};
use smsgw_sms::{ModemClient, ModemInfo, SendReceipt, SmsError, SmsSender};

/// Send SMS through mmcli (ModemManager).
#[derive(Parser, Debug)]
#[command(
    name = "smsgw-send-sms",
    version,
    about = "Send SMS through mmcli (ModemManager)",
    after_help = "Examples:\n  smsgw-send-sms --recipient \"+33612345678\" --message \"Hello World\"\n  smsgw-send-sms --device /dev/ttyUSB0 -r \"+33612345678\" -m \"Test\"\n  smsgw-send-sms --list-modems"
)]
struct Cli {
    /// Recipient in international format (+33612345678).
    #[arg(short, long, required_unless_present = "list_modems")]
    recipient: Option<String>,

    /// Message text.
    #[arg(short, long, required_unless_present = "list_modems")]
    message: Option<String>,

    /// Modem device path (e.g. /dev/ttyUSB0).
    #[arg(short, long)]
    device: Option<String>,

    /// List available modems.
    #[arg(short, long = "list-modems", alias = "list_modems", default_value_t = false)]
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
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = if e.downcast_ref::<SmsError>().is_some() {
                ErrorKind::SmsError
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

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ToolsConfig::load()?;
    let client = ModemClient::new(SystemRunner, config.sms);

    if cli.list_modems {
        let modems = client.find_modems().await?;
        if cli.json_output {
            output::print_pretty(&serde_json::json!({ "modems": modems }));
        } else {
            print_modems(&modems);
        }
        return Ok(());
    }

    let (Some(recipient), Some(message)) = (cli.recipient, cli.message) else {
        anyhow::bail!("--recipient and --message are required to send an SMS");
    };

    tracing::info!(recipient = %recipient, "sending SMS");
    let sender = SmsSender::new(client);
    let receipt = sender
        .send(&recipient, &message, cli.device.as_deref())
        .await?;

    if cli.json_output {
        output::print_pretty(&receipt);
    } else {
        print_receipt(&receipt);
    }
    Ok(())
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or("N/A")
}

fn print_modems(modems: &[ModemInfo]) {
    println!("Available modems:");
    for m in modems {
        println!("  ID: {}", m.id);
        println!("  Device: {}", or_na(m.device_path.as_deref()));
        println!("  IMEI: {}", or_na(m.imei.as_deref()));
        println!("  Operator: {}", or_na(m.operator.as_deref()));
        match m.signal_quality {
            Some(q) => println!("  Signal: {q}%"),
            None => println!("  Signal: N/A"),
        }
        match m.status {
            Some(status) => println!("  Status: {status}"),
            None => println!("  Status: N/A"),
        }
        println!();
    }
}

fn print_receipt(receipt: &SendReceipt) {
    println!("SMS sent successfully!");
    println!("Recipient: {}", receipt.recipient);
    println!("Modem: {}", receipt.modem_id);
    println!("Send duration: {}s", receipt.send_duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_requires_recipient_and_message() {
        let err = Cli::try_parse_from(["smsgw-send-sms", "-r", "+33612345678"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert!(Cli::try_parse_from(["smsgw-send-sms", "-l"]).is_ok());
    }

    #[test]
    fn short_flags() {
        let cli = Cli::try_parse_from([
            "smsgw-send-sms",
            "-r",
            "+33612345678",
            "-m",
            "Hello",
            "-d",
            "/dev/ttyUSB0",
            "--json-output",
        ])
        .unwrap();
        assert_eq!(cli.recipient.as_deref(), Some("+33612345678"));
        assert_eq!(cli.message.as_deref(), Some("Hello"));
        assert_eq!(cli.device.as_deref(), Some("/dev/ttyUSB0"));
        assert!(cli.json_output);
        assert!(!cli.list_modems);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
