use std::path::PathBuf;

use smsgw_common::exec::ExecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("{0}")]
    Exec(#[from] ExecError),
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("no active network interface found")]
    NoActiveInterface,
    #[error("no netplan configuration file found in {}", .0.display())]
    NoConfigFile(PathBuf),
    #[error("no ethernet configuration found")]
    NoEthernet,
    #[error("invalid netplan YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("all configuration parameters are required")]
    MissingParameters,
    #[error("invalid {field}: {value}")]
    InvalidParameter { field: &'static str, value: String },
    #[error("backup file required")]
    BackupFileRequired,
    #[error("backup file not found: {}", .0.display())]
    BackupNotFound(PathBuf),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl NetworkError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        NetworkError::Io {
            context: context.into(),
            source,
        }
    }
}
