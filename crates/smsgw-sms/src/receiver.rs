//! Inbound SMS collection.
//!
//! A cycle walks every ready modem, stores each SMS found in its memory and
//! deletes it from the modem once it is safely stored. SMS already handled
//! by this process are remembered so a failed delete does not re-store them;
//! an id is forgotten once the modem stops listing it.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use smsgw_common::exec::CommandRunner;

use crate::error::ReceiveError;
use crate::mmcli::ModemInfo;
use crate::modem::ModemClient;
use crate::store::{NewReceivedSms, ReceivedSmsStore, StoreOutcome};

/// Outcome of one receive cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    Completed {
        /// Newly stored SMS.
        processed: usize,
        /// Ready modems that were processed.
        modems: usize,
        total_modems: usize,
    },
    Failed {
        error: String,
    },
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleReport::Completed { .. })
    }
}

impl Serialize for CycleReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CycleReport::Completed {
                processed,
                modems,
                total_modems,
            } => {
                let mut s = serializer.serialize_struct("CycleReport", 4)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("processed", processed)?;
                s.serialize_field("modems", modems)?;
                s.serialize_field("total_modems", total_modems)?;
                s.end()
            }
            CycleReport::Failed { error } => {
                let mut s = serializer.serialize_struct("CycleReport", 2)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("error", error)?;
                s.end()
            }
        }
    }
}

pub struct SmsReceiver<R, S> {
    client: ModemClient<R>,
    store: S,
    /// SMS ids handled per modem id.
    handled: HashMap<String, HashSet<String>>,
}

impl<R: CommandRunner, S: ReceivedSmsStore> SmsReceiver<R, S> {
    pub fn new(client: ModemClient<R>, store: S) -> Self {
        Self {
            client,
            store,
            handled: HashMap::new(),
        }
    }

    pub fn client(&self) -> &ModemClient<R> {
        &self.client
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Modems that expose a primary port.
    pub async fn find_modems(&self) -> Result<Vec<ModemInfo>, ReceiveError> {
        let modems = self.client.find_modems().await?;
        Ok(modems
            .into_iter()
            .filter(|m| m.device_path.is_some())
            .collect())
    }

    /// Store and clear the SMS held by one modem; returns how many were
    /// newly stored.
    pub async fn process_modem(&mut self, modem: &ModemInfo) -> usize {
        let device_path = modem.device_path.as_deref().unwrap_or_default();
        tracing::info!(modem_id = %modem.id, device = device_path, "processing modem");

        let db_modem_id = match self.store.modem_id_by_device(device_path).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(modem_id = %modem.id, error = %e, "cannot look up modem row");
                None
            }
        };

        let sms_ids = self.client.list_sms(&modem.id).await;
        let mut handled = self.handled.remove(&modem.id).unwrap_or_default();
        handled.retain(|id| sms_ids.contains(id));
        if sms_ids.is_empty() {
            tracing::debug!(modem_id = %modem.id, "no SMS on modem");
            return 0;
        }
        tracing::info!(modem_id = %modem.id, count = sms_ids.len(), "SMS found on modem");

        let mut stored = 0;
        for sms_id in sms_ids {
            if handled.contains(&sms_id) {
                continue;
            }

            let Some(sms) = self.client.read_sms(&sms_id).await else {
                tracing::warn!(sms_id = %sms_id, "could not read SMS details");
                continue;
            };

            let received_at = sms
                .timestamp
                .unwrap_or_else(|| chrono::Local::now().naive_local());
            let record = NewReceivedSms {
                sender: sms.sender,
                message: sms.message,
                received_at,
                modem_id: db_modem_id,
            };

            match self.store.store(&record).await {
                Ok(StoreOutcome::Stored(id)) => {
                    stored += 1;
                    tracing::info!(
                        id,
                        sender = %record.sender,
                        preview = %preview(&record.message),
                        "SMS received"
                    );
                }
                Ok(StoreOutcome::Duplicate) => {}
                Err(e) => {
                    tracing::error!(sms_id = %sms_id, error = %e, "cannot store SMS; leaving it on the modem");
                    continue;
                }
            }

            if self.client.delete_sms(&modem.id, &sms_id).await {
                tracing::debug!(sms_id = %sms_id, "SMS deleted from modem");
            }
            handled.insert(sms_id);
        }

        if !handled.is_empty() {
            self.handled.insert(modem.id.clone(), handled);
        }
        stored
    }

    /// One pass over every ready modem.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let modems = match self.find_modems().await {
            Ok(modems) => modems,
            Err(e) => {
                tracing::error!(error = %e, "receive cycle failed");
                return CycleReport::Failed {
                    error: e.to_string(),
                };
            }
        };

        if modems.is_empty() {
            tracing::warn!("no modems found");
            self.handled.clear();
            return CycleReport::Completed {
                processed: 0,
                modems: 0,
                total_modems: 0,
            };
        }

        let mut processed = 0;
        let mut active = 0;
        for modem in modems.iter().filter(|m| m.is_ready()) {
            active += 1;
            processed += self.process_modem(modem).await;
        }
        self.handled
            .retain(|id, _| modems.iter().any(|m| m.is_ready() && &m.id == id));

        CycleReport::Completed {
            processed,
            modems: active,
            total_modems: modems.len(),
        }
    }

    /// Run cycles every `interval` until `shutdown` resolves.
    pub async fn run_daemon<F>(&mut self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(interval_s = interval.as_secs(), "SMS receiver daemon started");
        tokio::pin!(shutdown);

        loop {
            match self.run_cycle().await {
                CycleReport::Completed {
                    processed, modems, ..
                } if processed > 0 => {
                    tracing::info!(processed, modems, "receive cycle stored new SMS");
                }
                CycleReport::Completed { .. } => {}
                CycleReport::Failed { error } => {
                    tracing::error!(error = %error, "receive cycle failed; retrying next interval");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => {
                    tracing::info!("SMS receiver daemon stopped");
                    return;
                }
            }
        }
    }
}

/// First 50 characters of a message for log lines.
fn preview(message: &str) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(50).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
