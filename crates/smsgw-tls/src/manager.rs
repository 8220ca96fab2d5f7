//! Certificate lifecycle: self-signed generation, custom uploads,
//! backups and the nginx site that serves them.
//!
//! Certificates live in two places: the gateway's own ssl directory (the
//! source of backups) and nginx's ssl directory (what is actually served).
//! Every change writes both and reloads nginx.

use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{json, Map, Value};

use smsgw_common::config::SslSettings;
use smsgw_common::exec::{args, CommandRunner, QUERY_TIMEOUT};

use crate::error::SslError;
use crate::nginx;
use crate::openssl::CertificateInfo;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);
const RELOAD_TIMEOUT: Duration = Duration::from_secs(30);

const DIR_MODE: u32 = 0o755;
const CERT_MODE: u32 = 0o644;
const KEY_MODE: u32 = 0o600;

pub const BACKUP_PREFIX: &str = "ssl_backup_";
const BACKUP_INFO: &str = "backup_info.json";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Distinguished name and lifetime of a self-signed certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSubject {
    pub days: u32,
    pub country: String,
    pub state: String,
    pub city: String,
    pub organization: String,
    pub common_name: String,
}

impl Default for CertificateSubject {
    fn default() -> Self {
        Self {
            days: 3650,
            country: "MA".into(),
            state: "Casablanca".into(),
            city: "Casablanca".into(),
            organization: "SMS Gateway".into(),
            common_name: "localhost".into(),
        }
    }
}

impl CertificateSubject {
    /// The `-subj` argument for `openssl req`.
    pub fn distinguished_name(&self) -> String {
        format!(
            "/C={}/ST={}/L={}/O={}/CN={}",
            self.country, self.state, self.city, self.organization, self.common_name
        )
    }
}

/// A backup directory just written by [`CertificateManager::create_backup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupCreated {
    pub backup_file: PathBuf,
    pub timestamp: String,
}

pub struct CertificateManager<R> {
    runner: R,
    settings: SslSettings,
}

impl<R: CommandRunner> CertificateManager<R> {
    pub fn new(runner: R, settings: SslSettings) -> Self {
        Self { runner, settings }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn settings(&self) -> &SslSettings {
        &self.settings
    }

    /// Create the ssl, nginx ssl and backup directories.
    pub fn ensure_directories(&self) -> Result<(), SslError> {
        for dir in [
            &self.settings.ssl_dir,
            &self.settings.nginx_ssl_dir,
            &self.settings.backup_dir,
        ] {
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(DIR_MODE)
                .create(dir)
                .map_err(|e| SslError::io(format!("cannot create {}", dir.display()), e))?;
        }
        Ok(())
    }

    async fn openssl(&self, openssl_args: &[&str], timeout: Duration) -> Result<String, SslError> {
        let out = self.runner.run("openssl", &args(openssl_args), timeout).await?;
        if !out.success() {
            return Err(SslError::CommandFailed {
                command: format!("openssl {}", openssl_args.first().copied().unwrap_or_default()),
                stderr: out.error_text().to_string(),
            });
        }
        Ok(out.stdout)
    }

    /// Parsed details of the certificate at `path`; failures are reported in
    /// the `error` field.
    pub async fn certificate_info(&self, path: &Path) -> CertificateInfo {
        let path_arg = path.to_string_lossy().into_owned();
        match self
            .openssl(&["x509", "-noout", "-text", "-in", path_arg.as_str()], QUERY_TIMEOUT)
            .await
        {
            Ok(text) => CertificateInfo::parse(&text),
            Err(SslError::CommandFailed { .. }) => {
                CertificateInfo::unreadable("cannot read certificate")
            }
            Err(e) => CertificateInfo::unreadable(format!("cannot read certificate: {e}")),
        }
    }

    /// Generate a self-signed RSA 4096 certificate and install it for nginx.
    pub async fn generate(&self, subject: &CertificateSubject) -> Result<Value, SslError> {
        let cert_path = self.settings.cert_path();
        let key_path = self.settings.key_path();
        let cert_arg = cert_path.to_string_lossy().into_owned();
        let key_arg = key_path.to_string_lossy().into_owned();
        let days = subject.days.to_string();
        let dn = subject.distinguished_name();

        tracing::info!(subject = %dn, days = subject.days, "generating self-signed certificate");
        self.openssl(
            &[
                "req",
                "-x509",
                "-newkey",
                "rsa:4096",
                "-keyout",
                key_arg.as_str(),
                "-out",
                cert_arg.as_str(),
                "-days",
                days.as_str(),
                "-nodes",
                "-subj",
                dn.as_str(),
            ],
            GENERATE_TIMEOUT,
        )
        .await?;

        set_mode(&cert_path, CERT_MODE)?;
        set_mode(&key_path, KEY_MODE)?;
        self.install_for_nginx(&cert_path, &key_path)?;

        let info = self.certificate_info(&cert_path).await;
        tracing::info!(cert = %cert_path.display(), "self-signed certificate installed");
        Ok(json!({
            "success": true,
            "message": "SSL certificate generated successfully",
            "certificate_path": cert_path,
            "key_path": key_path,
            "info": info,
        }))
    }

    /// Check that both PEM documents parse and that the key belongs to the
    /// certificate.
    pub async fn validate_pair(&self, cert_pem: &str, key_pem: &str) -> Result<(), SslError> {
        let cert_tmp = temp_pem(".crt", cert_pem)?;
        let key_tmp = temp_pem(".key", key_pem)?;
        let cert_arg = cert_tmp.path().to_string_lossy().into_owned();
        let key_arg = key_tmp.path().to_string_lossy().into_owned();

        self.openssl(&["x509", "-noout", "-text", "-in", cert_arg.as_str()], QUERY_TIMEOUT)
            .await
            .map_err(|e| invalid("certificate", e))?;
        self.openssl(&["pkey", "-noout", "-in", key_arg.as_str()], QUERY_TIMEOUT)
            .await
            .map_err(|e| invalid("private key", e))?;

        let cert_pub = self
            .openssl(&["x509", "-noout", "-pubkey", "-in", cert_arg.as_str()], QUERY_TIMEOUT)
            .await
            .map_err(|e| invalid("certificate", e))?;
        let key_pub = self
            .openssl(&["pkey", "-pubout", "-in", key_arg.as_str()], QUERY_TIMEOUT)
            .await
            .map_err(|e| invalid("private key", e))?;

        if cert_pub.trim() != key_pub.trim() {
            return Err(SslError::InvalidCertificate(
                "private key does not match the certificate".into(),
            ));
        }
        Ok(())
    }

    /// Install a user-supplied certificate/key pair.
    ///
    /// The current certificates are backed up first; if nginx refuses to
    /// reload with the new pair, that backup is put back.
    pub async fn upload(&self, cert_pem: &str, key_pem: &str) -> Result<Value, SslError> {
        if cert_pem.trim().is_empty() || key_pem.trim().is_empty() {
            return Err(SslError::MissingUploadFiles);
        }
        self.validate_pair(cert_pem, key_pem).await?;

        let backup = self.create_backup()?;

        let custom_cert = self
            .settings
            .ssl_dir
            .join(format!("custom-{}", self.settings.cert_file));
        let custom_key = self
            .settings
            .ssl_dir
            .join(format!("custom-{}", self.settings.key_file));
        write_with_mode(&custom_cert, cert_pem, CERT_MODE)?;
        write_with_mode(&custom_key, key_pem, KEY_MODE)?;
        self.install_for_nginx(&custom_cert, &custom_key)?;

        if let Err(e) = self.reload_nginx().await {
            tracing::error!(error = %e, "nginx rejected the uploaded certificate, rolling back");
            if let Err(restore_err) = self.restore_from(Some(backup.backup_file.as_path())).await {
                tracing::warn!(error = %restore_err, "rollback failed");
            }
            return Err(e);
        }

        let info = self.certificate_info(&self.settings.nginx_cert_path()).await;
        tracing::info!(backup = %backup.backup_file.display(), "custom certificate installed");
        Ok(json!({
            "success": true,
            "message": "Custom certificate installed successfully",
            "backup_created": backup.backup_file,
            "info": info,
        }))
    }

    /// The certificate nginx currently serves, with file metadata.
    pub async fn current_info(&self) -> Value {
        let path = self.settings.nginx_cert_path();
        if !path.exists() {
            return json!({
                "exists": false,
                "message": "No SSL certificate installed",
            });
        }

        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                return json!({
                    "exists": false,
                    "error": format!("cannot read {}: {e}", path.display()),
                })
            }
        };
        let modified = meta
            .modified()
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
            .ok();

        let info = self.certificate_info(&path).await;
        let mut doc = match serde_json::to_value(info) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        doc.insert("exists".into(), json!(true));
        doc.insert("file_path".into(), json!(path));
        doc.insert("file_size".into(), json!(meta.len()));
        doc.insert("file_modified".into(), json!(modified));
        Value::Object(doc)
    }

    /// Copy the standard certificate and key from the ssl directory into a
    /// fresh `ssl_backup_<timestamp>` directory.
    pub fn create_backup(&self) -> Result<BackupCreated, SslError> {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let dir = self
            .settings
            .backup_dir
            .join(format!("{BACKUP_PREFIX}{timestamp}"));
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(&dir)
            .map_err(|e| SslError::io(format!("cannot create {}", dir.display()), e))?;

        for (source, name) in [
            (self.settings.cert_path(), &self.settings.cert_file),
            (self.settings.key_path(), &self.settings.key_file),
        ] {
            if source.is_file() {
                copy_file(&source, &dir.join(name))?;
            }
        }

        let info = json!({
            "timestamp": timestamp,
            "type": "ssl_certificates",
            "files": [self.settings.cert_file, self.settings.key_file],
        });
        let info_path = dir.join(BACKUP_INFO);
        std::fs::write(&info_path, serde_json::to_string_pretty(&info)?)
            .map_err(|e| SslError::io(format!("cannot write {}", info_path.display()), e))?;

        tracing::info!(dir = %dir.display(), "certificates backed up");
        Ok(BackupCreated {
            backup_file: dir,
            timestamp,
        })
    }

    /// [`Self::create_backup`] as a result document.
    pub fn backup(&self) -> Value {
        match self.create_backup() {
            Ok(created) => json!({
                "success": true,
                "backup_file": created.backup_file,
                "timestamp": created.timestamp,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "certificate backup failed");
                json!({
                    "success": false,
                    "error": format!("Backup failed: {e}"),
                })
            }
        }
    }

    /// The most recent backup directory by name.
    pub fn latest_backup(&self) -> Result<PathBuf, SslError> {
        let dir = &self.settings.backup_dir;
        self.backup_dirs()?
            .into_iter()
            .max()
            .ok_or_else(|| SslError::NoBackups(dir.clone()))
    }

    fn backup_dirs(&self) -> Result<Vec<PathBuf>, SslError> {
        let dir = &self.settings.backup_dir;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SslError::io(format!("cannot list {}", dir.display()), e)),
        };
        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(BACKUP_PREFIX))
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect())
    }

    /// Put a backup back in place and reload nginx. Failures are reported in
    /// the returned document rather than as an error.
    pub async fn restore(&self, backup_dir: Option<&Path>) -> Value {
        match self.restore_from(backup_dir).await {
            Ok(dir) => json!({
                "success": true,
                "message": "Certificates restored successfully",
                "restored_from": dir,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "certificate restore failed");
                json!({
                    "success": false,
                    "error": format!("Restore failed: {e}"),
                })
            }
        }
    }

    async fn restore_from(&self, backup_dir: Option<&Path>) -> Result<PathBuf, SslError> {
        let dir = match backup_dir {
            Some(dir) if dir.is_dir() => dir.to_path_buf(),
            Some(dir) => return Err(SslError::NoBackups(dir.to_path_buf())),
            None => self.latest_backup()?,
        };

        let cert = dir.join(&self.settings.cert_file);
        let key = dir.join(&self.settings.key_file);
        if !cert.is_file() || !key.is_file() {
            return Err(SslError::IncompleteBackup(dir));
        }

        copy_file(&cert, &self.settings.cert_path())?;
        copy_file(&key, &self.settings.key_path())?;
        set_mode(&self.settings.cert_path(), CERT_MODE)?;
        set_mode(&self.settings.key_path(), KEY_MODE)?;
        self.install_for_nginx(&cert, &key)?;

        tracing::info!(from = %dir.display(), "certificates restored");
        self.reload_nginx().await?;
        Ok(dir)
    }

    /// Every backup directory, newest first.
    pub fn list_backups(&self) -> Result<Vec<Value>, SslError> {
        let mut backups: Vec<Value> = self
            .backup_dirs()?
            .into_iter()
            .map(|path| backup_record(&path))
            .collect();
        backups.sort_by(|a, b| {
            let ts = |v: &Value| v["timestamp"].as_str().unwrap_or_default().to_string();
            ts(b).cmp(&ts(a))
        });
        Ok(backups)
    }

    /// Rewrite the nginx site for HTTPS, keeping a dated copy of the old one.
    pub async fn update_nginx(&self) -> Value {
        match self.update_nginx_inner().await {
            Ok(()) => json!({
                "success": true,
                "message": "nginx configuration updated for HTTPS",
            }),
            Err(e) => {
                tracing::warn!(error = %e, "nginx update failed");
                json!({
                    "success": false,
                    "error": format!("nginx update failed: {e}"),
                })
            }
        }
    }

    async fn update_nginx_inner(&self) -> Result<(), SslError> {
        let site = &self.settings.nginx_site;
        let previous = if site.exists() {
            let mut backup = site.as_os_str().to_owned();
            backup.push(format!(".backup.{}", Local::now().format(TIMESTAMP_FORMAT)));
            let backup = PathBuf::from(backup);
            copy_file(site, &backup)?;
            Some(backup)
        } else {
            None
        };

        replace_file(site, &nginx::render_site(&self.settings), CERT_MODE)?;
        tracing::info!(site = %site.display(), "nginx site written");

        if let Err(e) = self.test_nginx().await {
            roll_back_site(site, previous.as_deref());
            return Err(e);
        }
        self.reload_nginx().await
    }

    async fn test_nginx(&self) -> Result<(), SslError> {
        let out = self.runner.run("nginx", &args(["-t"]), QUERY_TIMEOUT).await?;
        if !out.success() {
            return Err(SslError::NginxConfig(out.error_text().to_string()));
        }
        Ok(())
    }

    pub async fn reload_nginx(&self) -> Result<(), SslError> {
        let out = self
            .runner
            .run("systemctl", &args(["reload", "nginx"]), RELOAD_TIMEOUT)
            .await?;
        if !out.success() {
            return Err(SslError::Reload(out.error_text().to_string()));
        }
        tracing::info!("nginx reloaded");
        Ok(())
    }

    /// Copy a pair under the standard names into nginx's ssl directory.
    fn install_for_nginx(&self, cert: &Path, key: &Path) -> Result<(), SslError> {
        let nginx_cert = self.settings.nginx_cert_path();
        let nginx_key = self.settings.nginx_key_path();
        copy_file(cert, &nginx_cert)?;
        copy_file(key, &nginx_key)?;
        set_mode(&nginx_cert, CERT_MODE)?;
        set_mode(&nginx_key, KEY_MODE)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn invalid(what: &str, err: SslError) -> SslError {
    match err {
        SslError::CommandFailed { stderr, .. } => {
            SslError::InvalidCertificate(format!("{what} rejected by openssl: {stderr}"))
        }
        other => other,
    }
}

fn temp_pem(suffix: &str, contents: &str) -> Result<tempfile::NamedTempFile, SslError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .map_err(|e| SslError::io("cannot create temp file", e))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|()| tmp.flush())
        .map_err(|e| SslError::io("cannot write temp file", e))?;
    Ok(tmp)
}

fn set_mode(path: &Path, mode: u32) -> Result<(), SslError> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| SslError::io(format!("cannot chmod {}", path.display()), e))
}

fn copy_file(from: &Path, to: &Path) -> Result<(), SslError> {
    std::fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| SslError::io(format!("cannot copy {} to {}", from.display(), to.display()), e))
}

/// Write through a temp file in the same directory, then rename over `path`.
fn replace_file(path: &Path, contents: &str, mode: u32) -> Result<(), SslError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| SslError::io(format!("cannot create temp file in {}", dir.display()), e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| SslError::io(format!("cannot write {}", path.display()), e))?;
    set_mode(tmp.path(), mode)?;
    tmp.persist(path)
        .map_err(|e| SslError::io(format!("cannot replace {}", path.display()), e.error))?;
    Ok(())
}

/// Put the previous site back, or remove a site that did not exist before.
fn roll_back_site(site: &Path, previous: Option<&Path>) {
    let result = match previous {
        Some(backup) => copy_file(backup, site),
        None => std::fs::remove_file(site)
            .map_err(|e| SslError::io(format!("cannot remove {}", site.display()), e)),
    };
    match result {
        Ok(()) => tracing::warn!(site = %site.display(), "nginx site rolled back"),
        Err(e) => tracing::error!(site = %site.display(), error = %e, "nginx site rollback failed"),
    }
}

fn write_with_mode(path: &Path, contents: &str, mode: u32) -> Result<(), SslError> {
    std::fs::write(path, contents)
        .map_err(|e| SslError::io(format!("cannot write {}", path.display()), e))?;
    set_mode(path, mode)
}

/// `name`, `path`, `timestamp` and `size`, overlaid with `backup_info.json`.
fn backup_record(path: &Path) -> Value {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut record = Map::new();
    record.insert(
        "timestamp".into(),
        json!(name.strip_prefix(BACKUP_PREFIX).unwrap_or(&name)),
    );
    record.insert("name".into(), json!(name));
    record.insert("path".into(), json!(path));
    record.insert("size".into(), json!(directory_size(path)));

    let info = std::fs::read_to_string(path.join(BACKUP_INFO))
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok());
    if let Some(Value::Object(info)) = info {
        record.extend(info);
    }
    Value::Object(record)
}

/// Total size of the regular files below `path`.
fn directory_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => directory_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}
