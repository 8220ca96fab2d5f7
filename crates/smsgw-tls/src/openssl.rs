//! Certificate details from `openssl x509 -noout -text`.

use serde::Serialize;

/// The fields of a certificate the web UI shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// As printed by openssl, e.g. `(4096 bit)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_size: Option<String>,
    /// Set instead of the fields above when the certificate is unreadable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CertificateInfo {
    pub fn unreadable(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Parse the text dump. OpenSSL 1.x prints `RSA Public-Key: (N bit)`,
    /// OpenSSL 3 prints `Public-Key: (N bit)`.
    pub fn parse(text: &str) -> Self {
        let mut info = Self::default();
        for line in text.lines().map(str::trim) {
            let field = |prefix: &str| line.strip_prefix(prefix).map(|v| v.trim().to_string());

            if let Some(v) = field("Subject:") {
                info.subject.get_or_insert(v);
            } else if let Some(v) = field("Issuer:") {
                info.issuer.get_or_insert(v);
            } else if let Some(v) = field("Not Before:") {
                info.valid_from.get_or_insert(v);
            } else if let Some(v) = field("Not After :") {
                info.valid_until.get_or_insert(v);
            } else if let Some(v) = field("Public Key Algorithm:") {
                info.algorithm.get_or_insert(v);
            } else if let Some(v) = field("RSA Public-Key:").or_else(|| field("Public-Key:")) {
                info.key_size.get_or_insert(v);
            }
        }
        info
    }
}
