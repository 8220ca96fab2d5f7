use std::path::PathBuf;

use smsgw_common::exec::ExecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SslError {
    #[error("{0}")]
    Exec(#[from] ExecError),
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("invalid certificate or private key: {0}")]
    InvalidCertificate(String),
    #[error("certificate and key files are required")]
    MissingUploadFiles,
    #[error("no backup found in {}", .0.display())]
    NoBackups(PathBuf),
    #[error("backup files missing in {}", .0.display())]
    IncompleteBackup(PathBuf),
    #[error("invalid nginx configuration: {0}")]
    NginxConfig(String),
    #[error("nginx reload failed: {0}")]
    Reload(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode backup info: {0}")]
    Json(#[from] serde_json::Error),
}

impl SslError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SslError::Io {
            context: context.into(),
            source,
        }
    }
}
