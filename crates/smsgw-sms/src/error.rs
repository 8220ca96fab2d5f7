use smsgw_common::config::ConfigError;
use smsgw_common::exec::ExecError;
use thiserror::Error;

/// Failures of modem discovery and outbound SMS.
#[derive(Debug, Error)]
pub enum SmsError {
    #[error("{0}")]
    Exec(#[from] ExecError),
    #[error("modem discovery failed: {0}")]
    Discovery(String),
    #[error("no modem found for device {0}")]
    DeviceNotFound(String),
    #[error("no ready modem found")]
    NoReadyModem,
    #[error("invalid phone number: {0}")]
    InvalidRecipient(String),
    #[error("empty message")]
    EmptyMessage,
    #[error("message too long: {len} characters (max {max})")]
    MessageTooLong { len: usize, max: usize },
    #[error("message cannot contain both ' and \" quote characters")]
    Unquotable,
    #[error("SMS creation failed: {0}")]
    CreateFailed(String),
    #[error("could not find the id of the created SMS")]
    MissingSmsId,
    #[error("SMS send failed: {0}")]
    SendFailed(String),
}

/// Failures of the receive side.
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Modem(#[from] SmsError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
