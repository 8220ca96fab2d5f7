//! Network manager: interface discovery, netplan rewrite and apply,
//! connectivity probes, backup and restore.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use smsgw_common::config::NetworkSettings;
use smsgw_common::exec::{args, CommandRunner, QUERY_TIMEOUT};

use crate::error::NetworkError;
use crate::iproute::{self, InterfaceDetails, InterfaceInfo};
use crate::netplan::{self, NetplanSummary, StaticConfig};

/// `get_config` result: the netplan summary plus live interface state.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentConfiguration {
    #[serde(flatten)]
    pub summary: NetplanSummary,
    pub current_interface: InterfaceInfo,
    #[serde(skip)]
    pub config_file: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityTests {
    pub gateway: bool,
    pub dns_primary: bool,
    pub dns_secondary: bool,
    pub internet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub tests: ConnectivityTests,
    pub overall_status: bool,
}

pub struct NetworkManager<R> {
    runner: R,
    settings: NetworkSettings,
}

impl<R: CommandRunner> NetworkManager<R> {
    pub fn new(runner: R, settings: NetworkSettings) -> Self {
        Self { runner, settings }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn ip(&self, ip_args: &[&str]) -> Result<String, NetworkError> {
        let out = self.runner.run("ip", &args(ip_args), QUERY_TIMEOUT).await?;
        if !out.success() {
            return Err(NetworkError::CommandFailed {
                command: format!("ip {}", ip_args.join(" ")),
                stderr: out.error_text().to_string(),
            });
        }
        Ok(out.stdout)
    }

    /// The first active, non-virtual interface and its details.
    pub async fn primary_interface(&self) -> Result<InterfaceInfo, NetworkError> {
        let links = self.ip(&["link", "show"]).await?;
        let name = iproute::parse_active_interfaces(&links, &self.settings.ignored_prefixes)
            .into_iter()
            .next()
            .ok_or(NetworkError::NoActiveInterface)?;

        tracing::debug!(interface = %name, "primary interface selected");
        let details = self.interface_details(&name).await?;
        Ok(InterfaceInfo { name, details })
    }

    pub async fn interface_details(&self, name: &str) -> Result<InterfaceDetails, NetworkError> {
        let addrs = self.ip(&["addr", "show", name]).await?;
        Ok(iproute::parse_interface_details(&addrs))
    }

    /// The netplan file the gateway owns: the first `*.yaml`/`*.yml` by name.
    pub fn config_file(&self) -> Result<PathBuf, NetworkError> {
        let dir = &self.settings.netplan_dir;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NetworkError::NoConfigFile(dir.clone()))
            }
            Err(e) => return Err(NetworkError::io(format!("cannot list {}", dir.display()), e)),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && matches!(
                        path.extension().and_then(|e| e.to_str()),
                        Some("yaml") | Some("yml")
                    )
            })
            .collect();
        files.sort();
        files
            .into_iter()
            .next()
            .ok_or_else(|| NetworkError::NoConfigFile(dir.clone()))
    }

    fn read_summary(&self, path: &Path) -> Result<NetplanSummary, NetworkError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| NetworkError::io(format!("cannot read {}", path.display()), e))?;
        let value: serde_yaml::Value =
            serde_yaml::from_str(&raw).map_err(|source| NetworkError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        netplan::summarize(&value)
    }

    /// Summarise the netplan file and attach the live primary interface.
    pub async fn current_configuration(&self) -> Result<CurrentConfiguration, NetworkError> {
        let config_file = self.config_file()?;
        let summary = self.read_summary(&config_file)?;
        let current_interface = self.primary_interface().await?;
        Ok(CurrentConfiguration {
            summary,
            current_interface,
            config_file,
        })
    }

    async fn netplan_apply(&self) -> Result<String, NetworkError> {
        let (program, rest) = self
            .settings
            .apply_command
            .split_first()
            .ok_or(NetworkError::InvalidParameter {
                field: "apply_command",
                value: String::new(),
            })?;
        let timeout = Duration::from_secs(self.settings.apply_timeout_secs);
        let out = self.runner.run(program, rest, timeout).await?;
        if !out.success() {
            return Err(NetworkError::CommandFailed {
                command: self.settings.apply_command.join(" "),
                stderr: out.error_text().to_string(),
            });
        }
        tracing::info!("netplan configuration applied");
        Ok(out.stdout)
    }

    /// Replace the netplan file with `plan` and apply it.
    pub async fn apply_configuration(&self, plan: &StaticConfig) -> Result<Value, NetworkError> {
        plan.validate()?;
        let current = self.current_configuration().await?;
        let interface = &current.summary.interface_name;

        let yaml = plan
            .to_document(interface)?
            .to_yaml()
            .map_err(|source| NetworkError::Yaml {
                path: current.config_file.clone(),
                source,
            })?;
        write_atomically(&current.config_file, yaml.as_bytes())?;
        tracing::info!(
            interface = %interface,
            file = %current.config_file.display(),
            primary_ip = %plan.primary_ip,
            "netplan configuration written"
        );

        let output = self.netplan_apply().await?;
        Ok(json!({
            "success": true,
            "message": "Configuration applied successfully",
            "output": output,
        }))
    }

    /// One ICMP echo; any failure to run `ping` counts as unreachable.
    pub async fn ping_host(&self, host: &str) -> bool {
        let wait = self.settings.ping_timeout_secs;
        let wait_arg = wait.to_string();
        let timeout = Duration::from_secs(wait + 2);
        match self
            .runner
            .run("ping", &args(["-c", "1", "-W", wait_arg.as_str(), host]), timeout)
            .await
        {
            Ok(out) => out.success(),
            Err(e) => {
                tracing::debug!(host, error = %e, "ping failed");
                false
            }
        }
    }

    pub async fn test_connectivity(&self) -> Result<ConnectivityReport, NetworkError> {
        let current = self.current_configuration().await?;
        let summary = &current.summary;
        let mut tests = ConnectivityTests::default();

        if let Some(gateway) = &summary.gateway {
            tests.gateway = self.ping_host(gateway).await;
        }
        if let Some(dns) = &summary.dns_primary {
            tests.dns_primary = self.ping_host(dns).await;
        }
        if let Some(dns) = &summary.dns_secondary {
            tests.dns_secondary = self.ping_host(dns).await;
        }
        tests.internet = self.ping_host(&self.settings.internet_probe).await;

        let overall_status =
            tests.gateway && tests.dns_primary && tests.dns_secondary && tests.internet;
        tracing::info!(?tests, overall_status, "connectivity test finished");
        Ok(ConnectivityReport {
            tests,
            overall_status,
        })
    }

    /// Copy the netplan file to `backup_file`. Failures are reported in the
    /// returned document rather than as an error.
    pub fn backup_configuration(&self, backup_file: &Path) -> Value {
        let result = self.config_file().and_then(|source| {
            std::fs::copy(&source, backup_file).map_err(|e| {
                NetworkError::io(format!("cannot copy {}", source.display()), e)
            })
        });

        match result {
            Ok(_) => {
                tracing::info!(file = %backup_file.display(), "netplan backup created");
                json!({
                    "success": true,
                    "message": "Backup created successfully",
                    "file": backup_file,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "netplan backup failed");
                json!({
                    "success": false,
                    "error": format!("Backup failed: {e}"),
                })
            }
        }
    }

    /// Copy `backup_file` over the netplan file and apply it. Failures are
    /// reported in the returned document rather than as an error.
    pub async fn restore_configuration(&self, backup_file: &Path) -> Value {
        match self.restore_inner(backup_file).await {
            Ok(output) => json!({
                "success": true,
                "message": "Configuration restored successfully",
                "output": output,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "netplan restore failed");
                json!({
                    "success": false,
                    "error": format!("Restore failed: {e}"),
                })
            }
        }
    }

    async fn restore_inner(&self, backup_file: &Path) -> Result<String, NetworkError> {
        if !backup_file.is_file() {
            return Err(NetworkError::BackupNotFound(backup_file.to_path_buf()));
        }
        let target = self.config_file()?;
        std::fs::copy(backup_file, &target)
            .map_err(|e| NetworkError::io(format!("cannot restore {}", target.display()), e))?;
        tracing::info!(from = %backup_file.display(), to = %target.display(), "netplan file restored");
        self.netplan_apply().await
    }
}

/// Write through a temp file in the same directory, then rename over `path`.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), NetworkError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| NetworkError::io(format!("cannot create temp file in {}", dir.display()), e))?;
    tmp.write_all(contents)
        .map_err(|e| NetworkError::io("cannot write netplan file", e))?;

    // Keep the original file's permissions.
    if let Ok(meta) = std::fs::metadata(path) {
        std::fs::set_permissions(tmp.path(), meta.permissions()).map_err(|e| {
            NetworkError::io(format!("cannot copy permissions of {}", path.display()), e)
        })?;
    }

    tmp.persist(path)
        .map_err(|e| NetworkError::io(format!("cannot replace {}", path.display()), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01-netcfg.yaml");
        std::fs::write(&path, "old").unwrap();
        write_atomically(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01-netcfg.yaml");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        write_atomically(&path, b"new").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn connectivity_report_shape() {
        let report = ConnectivityReport {
            tests: ConnectivityTests {
                gateway: true,
                ..Default::default()
            },
            overall_status: false,
        };
        let v = serde_json::to_value(report).unwrap();
        assert_eq!(v["tests"]["gateway"], true);
        assert_eq!(v["tests"]["internet"], false);
        assert_eq!(v["overall_status"], false);
    }
}
