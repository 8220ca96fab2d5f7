//! JSON documents printed on stdout for the PHP caller.

use serde::Serialize;
use serde_json::{json, Value};

/// `error_type` values understood by the PHP services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NetworkError,
    SmsError,
    SmsReceiveError,
    SslError,
    SystemError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NetworkError => write!(f, "NETWORK_ERROR"),
            ErrorKind::SmsError => write!(f, "SMS_ERROR"),
            ErrorKind::SmsReceiveError => write!(f, "SMS_RECEIVE_ERROR"),
            ErrorKind::SslError => write!(f, "SSL_ERROR"),
            ErrorKind::SystemError => write!(f, "SYSTEM_ERROR"),
        }
    }
}

/// The single-line failure document.
pub fn error_document(kind: ErrorKind, message: impl std::fmt::Display) -> Value {
    json!({
        "success": false,
        "error": message.to_string(),
        "error_type": kind,
    })
}

/// `{"success": true, "data": ...}`
pub fn data_document(data: impl Serialize) -> Value {
    json!({
        "success": true,
        "data": data,
    })
}

/// Print a success document, pretty with a 2-space indent.
pub fn print_pretty(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize result");
            print_error(ErrorKind::SystemError, e);
        }
    }
}

/// Print the compact failure document.
pub fn print_error(kind: ErrorKind, message: impl std::fmt::Display) {
    println!("{}", error_document(kind, message));
}
