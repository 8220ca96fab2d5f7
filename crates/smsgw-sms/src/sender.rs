//! Outbound SMS.

use std::time::Instant;

use serde::Serialize;

use smsgw_common::exec::CommandRunner;

use crate::error::SmsError;
use crate::modem::ModemClient;
use crate::phone;

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendReceipt {
    pub success: bool,
    pub modem_id: String,
    pub sms_id: String,
    pub recipient: String,
    /// Length of the message in characters.
    pub message_length: usize,
    /// Seconds, rounded to two decimals.
    pub send_duration: f64,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
}

pub struct SmsSender<R> {
    client: ModemClient<R>,
}

impl<R: CommandRunner> SmsSender<R> {
    pub fn new(client: ModemClient<R>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ModemClient<R> {
        &self.client
    }

    /// Validate, pick a modem, create the SMS, send it and clean it up.
    pub async fn send(
        &self,
        recipient: &str,
        message: &str,
        device: Option<&str>,
    ) -> Result<SendReceipt, SmsError> {
        let recipient = phone::validate(recipient)?;
        self.check_message(message)?;

        let started = Instant::now();
        let modem = self.client.select_modem(device).await?;
        tracing::info!(modem_id = %modem.id, recipient = %recipient, "sending SMS");

        let sms_id = self.client.create_sms(&modem.id, &recipient, message).await?;
        tracing::debug!(modem_id = %modem.id, sms_id = %sms_id, "SMS created");

        if let Err(e) = self.client.send_sms(&sms_id).await {
            self.client.delete_sms(&modem.id, &sms_id).await;
            return Err(e);
        }
        tracing::info!(modem_id = %modem.id, sms_id = %sms_id, recipient = %recipient, "SMS sent");

        if !self.client.delete_sms(&modem.id, &sms_id).await {
            tracing::warn!(sms_id = %sms_id, "sent SMS left in modem storage");
        }

        let elapsed = started.elapsed().as_secs_f64();
        Ok(SendReceipt {
            success: true,
            modem_id: modem.id,
            sms_id,
            recipient,
            message_length: message.chars().count(),
            send_duration: (elapsed * 100.0).round() / 100.0,
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        })
    }

    fn check_message(&self, message: &str) -> Result<(), SmsError> {
        if message.trim().is_empty() {
            return Err(SmsError::EmptyMessage);
        }
        let len = message.chars().count();
        let max = self.client.settings().max_message_chars;
        if len > max {
            return Err(SmsError::MessageTooLong { len, max });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smsgw_common::config::SmsSettings;
    use smsgw_common::test_util::ScriptedRunner;

    fn sender() -> SmsSender<ScriptedRunner> {
        SmsSender::new(ModemClient::new(ScriptedRunner::new(), SmsSettings::default()))
    }

    #[tokio::test]
    async fn validation_happens_before_modem_lookup() {
        let s = sender();
        assert!(matches!(
            s.send("0612345678", "hi", None).await,
            Err(SmsError::InvalidRecipient(_))
        ));
        assert!(matches!(
            s.send("+33612345678", "  \n", None).await,
            Err(SmsError::EmptyMessage)
        ));
        assert!(matches!(
            s.send("+33612345678", &"x".repeat(1601), None).await,
            Err(SmsError::MessageTooLong { len: 1601, max: 1600 })
        ));
        assert!(s.client().runner().calls().is_empty());
    }

    #[tokio::test]
    async fn limit_counts_characters() {
        let s = sender();
        // 1600 two-byte characters are within the limit; the failure is the
        // missing mmcli, not the length.
        let err = s.send("+33612345678", &"é".repeat(1600), None).await.unwrap_err();
        assert!(matches!(err, SmsError::Exec(_)));
    }
}
