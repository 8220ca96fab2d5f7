//! TLS certificate management for the gateway's nginx front end.
//!
//! This crate contains:
//! - **Certificate inspection**: parsing `openssl x509 -text` output
//! - **Certificate manager**: generate, upload, back up and restore certificates
//! - **nginx site**: the HTTPS server block and its test/reload cycle

pub mod error;
pub mod manager;
pub mod nginx;
pub mod openssl;

pub use error::SslError;
pub use manager::{CertificateManager, CertificateSubject};
pub use openssl::CertificateInfo;
