//! SMS through ModemManager.
//!
//! This crate contains:
//! - **mmcli parsing**: section-aware reading of `mmcli` text output
//! - **Modem client**: modem discovery, SMS create/send/list/read/delete
//! - **Sender**: validated outbound SMS with a timing receipt
//! - **Receiver**: inbound collection cycles and the polling daemon
//! - **Stores**: de-duplicating `received_sms` persistence (MySQL and in-memory)

pub mod error;
pub mod message;
pub mod mmcli;
pub mod modem;
pub mod phone;
pub mod receiver;
pub mod sender;
pub mod store;

pub use error::{ReceiveError, SmsError};
pub use mmcli::{InboundSms, ModemInfo, ModemStatus};
pub use modem::ModemClient;
pub use receiver::{CycleReport, SmsReceiver};
pub use sender::{SendReceipt, SmsSender};
pub use store::{MemoryStore, MySqlStore, NewReceivedSms, ReceivedSmsStore, StoreOutcome};
