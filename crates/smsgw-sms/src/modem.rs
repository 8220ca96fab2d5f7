//! ModemManager client over `mmcli`.

use std::time::Duration;

use smsgw_common::config::SmsSettings;
use smsgw_common::exec::{args, CommandOutput, CommandRunner, QUERY_TIMEOUT};

use crate::error::SmsError;
use crate::mmcli::{self, InboundSms, ModemInfo, Record};

/// Timeout for listing the SMS stored on a modem.
const LIST_SMS_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ModemClient<R> {
    runner: R,
    settings: SmsSettings,
}

impl<R: CommandRunner> ModemClient<R> {
    pub fn new(runner: R, settings: SmsSettings) -> Self {
        Self { runner, settings }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn settings(&self) -> &SmsSettings {
        &self.settings
    }

    async fn mmcli(&self, mm_args: &[&str], timeout: Duration) -> Result<CommandOutput, SmsError> {
        Ok(self.runner.run("mmcli", &args(mm_args), timeout).await?)
    }

    /// Every modem ModemManager knows about. Modems whose details cannot be
    /// read are skipped.
    pub async fn find_modems(&self) -> Result<Vec<ModemInfo>, SmsError> {
        let out = self.mmcli(&["-L"], QUERY_TIMEOUT).await?;
        if !out.success() {
            return Err(SmsError::Discovery(out.error_text().to_string()));
        }

        let mut modems = Vec::new();
        for id in mmcli::modem_ids(&out.stdout) {
            if let Some(info) = self.modem_info(&id).await {
                modems.push(info);
            }
        }
        tracing::debug!(count = modems.len(), "modems discovered");
        Ok(modems)
    }

    pub async fn modem_info(&self, modem_id: &str) -> Option<ModemInfo> {
        match self.mmcli(&["-m", modem_id], QUERY_TIMEOUT).await {
            Ok(out) if out.success() => {
                Some(ModemInfo::from_record(modem_id, &Record::parse(&out.stdout)))
            }
            Ok(out) => {
                tracing::warn!(modem_id, error = out.error_text(), "cannot read modem details");
                None
            }
            Err(e) => {
                tracing::warn!(modem_id, error = %e, "cannot read modem details");
                None
            }
        }
    }

    /// The modem to send through: the one on `device` when given, otherwise
    /// the ready modem with the best signal.
    pub async fn select_modem(&self, device: Option<&str>) -> Result<ModemInfo, SmsError> {
        let modems = self.find_modems().await?;
        match device {
            Some(device) => modems
                .into_iter()
                .find(|m| m.device_path.as_deref().is_some_and(|p| same_device(p, device)))
                .ok_or_else(|| SmsError::DeviceNotFound(device.to_string())),
            None => best_modem(&modems).cloned().ok_or(SmsError::NoReadyModem),
        }
    }

    /// Store a new outgoing SMS on the modem and return its index.
    pub async fn create_sms(
        &self,
        modem_id: &str,
        recipient: &str,
        text: &str,
    ) -> Result<String, SmsError> {
        let fields = format!("text={},number={}", quote(text)?, quote(recipient)?);
        let create_arg = format!("--messaging-create-sms={fields}");
        let timeout = Duration::from_secs(self.settings.create_timeout_secs);

        let out = self.mmcli(&["-m", modem_id, create_arg.as_str()], timeout).await?;
        if !out.success() {
            return Err(SmsError::CreateFailed(out.error_text().to_string()));
        }
        mmcli::created_sms_id(&out.stdout).ok_or(SmsError::MissingSmsId)
    }

    pub async fn send_sms(&self, sms_id: &str) -> Result<(), SmsError> {
        let timeout = Duration::from_secs(self.settings.send_timeout_secs);
        let out = self.mmcli(&["-s", sms_id, "--send"], timeout).await?;
        if !out.success() {
            return Err(SmsError::SendFailed(out.error_text().to_string()));
        }
        Ok(())
    }

    /// Remove an SMS from modem storage; returns whether it worked.
    pub async fn delete_sms(&self, modem_id: &str, sms_id: &str) -> bool {
        match self
            .mmcli(&["-m", modem_id, "--messaging-delete-sms", sms_id], QUERY_TIMEOUT)
            .await
        {
            Ok(out) if out.success() => true,
            Ok(out) => {
                tracing::warn!(modem_id, sms_id, error = out.error_text(), "cannot delete SMS");
                false
            }
            Err(e) => {
                tracing::warn!(modem_id, sms_id, error = %e, "cannot delete SMS");
                false
            }
        }
    }

    /// Indices of the SMS stored on a modem; empty when listing fails.
    pub async fn list_sms(&self, modem_id: &str) -> Vec<String> {
        match self
            .mmcli(&["-m", modem_id, "--messaging-list-sms"], LIST_SMS_TIMEOUT)
            .await
        {
            Ok(out) if out.success() => mmcli::sms_ids(&out.stdout),
            Ok(out) => {
                tracing::warn!(modem_id, error = out.error_text(), "cannot list SMS");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(modem_id, error = %e, "cannot list SMS");
                Vec::new()
            }
        }
    }

    /// Sender, text and timestamp of a stored SMS.
    pub async fn read_sms(&self, sms_id: &str) -> Option<InboundSms> {
        match self.mmcli(&["-s", sms_id], QUERY_TIMEOUT).await {
            Ok(out) if out.success() => InboundSms::from_record(sms_id, &Record::parse(&out.stdout)),
            Ok(out) => {
                tracing::warn!(sms_id, error = out.error_text(), "cannot read SMS");
                None
            }
            Err(e) => {
                tracing::warn!(sms_id, error = %e, "cannot read SMS");
                None
            }
        }
    }
}

/// Device paths compare equal with or without a `/dev/` prefix.
fn same_device(a: &str, b: &str) -> bool {
    let strip = |p: &str| p.strip_prefix("/dev/").unwrap_or(p).to_string();
    strip(a.trim()) == strip(b.trim())
}

/// The ready modem with the highest signal quality; the first one wins ties.
pub fn best_modem(modems: &[ModemInfo]) -> Option<&ModemInfo> {
    modems
        .iter()
        .filter(|m| m.is_ready())
        .min_by_key(|m| std::cmp::Reverse(m.signal_quality.unwrap_or(0)))
}

/// Quote a value for `--messaging-create-sms` with a quote character it
/// does not contain.
fn quote(value: &str) -> Result<String, SmsError> {
    if !value.contains('\'') {
        Ok(format!("'{value}'"))
    } else if !value.contains('"') {
        Ok(format!("\"{value}\""))
    } else {
        Err(SmsError::Unquotable)
    }
}
