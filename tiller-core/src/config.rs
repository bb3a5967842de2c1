use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level registry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TillerConfig {
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub balancer: BalancerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Admin API listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_addr")]
    pub addr: String,
    /// Shared secret expected in `X-Auth-Token`. Unset disables auth.
    pub token: Option<String>,
    /// Certificate/key pair for the listener.
    pub tls: Option<TlsConfig>,
    /// Generate a self-signed certificate when `tls` is unset.
    #[serde(default = "default_true")]
    pub self_signed: bool,
    /// Subject name used for the self-signed certificate.
    #[serde(default = "default_tls_host")]
    pub tls_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    #[serde(default = "default_driver")]
    pub driver: BalancerDriver,
    #[serde(default = "default_ipvsadm_path")]
    pub ipvsadm_path: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BalancerDriver {
    Ipvsadm,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// When false, no counters are registered and `/metrics` is empty.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_admin_addr() -> String { "0.0.0.0:8443".into() }
fn default_true() -> bool { true }
fn default_tls_host() -> String { "tiller.local".into() }
fn default_store_backend() -> StoreBackend { StoreBackend::File }
fn default_store_path() -> PathBuf { PathBuf::from("/var/db/tiller") }
fn default_driver() -> BalancerDriver { BalancerDriver::Ipvsadm }
fn default_ipvsadm_path() -> String { "ipvsadm".into() }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            addr: default_admin_addr(),
            token: None,
            tls: None,
            self_signed: true,
            tls_host: default_tls_host(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            ipvsadm_path: default_ipvsadm_path(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl TillerConfig {
    /// Load from a YAML file, then apply `TILLER_` environment overrides
    /// (`TILLER_ADMIN__TOKEN=...`).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: TillerConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("TILLER_").split("__"))
            .extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_admin_config_has_expected_values() {
        let cfg = AdminConfig::default();
        assert_eq!(cfg.addr, "0.0.0.0:8443");
        assert!(cfg.token.is_none());
        assert!(cfg.tls.is_none());
        assert!(cfg.self_signed);
    }

    #[test]
    fn default_store_is_file_backed() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.backend, StoreBackend::File);
        assert_eq!(cfg.path, PathBuf::from("/var/db/tiller"));
    }

    #[test]
    fn default_balancer_is_ipvsadm() {
        let cfg = BalancerConfig::default();
        assert_eq!(cfg.driver, BalancerDriver::Ipvsadm);
        assert_eq!(cfg.ipvsadm_path, "ipvsadm");
    }

    #[test]
    fn load_from_valid_yaml_overrides_defaults() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmpfile,
            "admin:\n  addr: \"127.0.0.1:9443\"\n  token: \"secret\"\nstore:\n  backend: memory\nbalancer:\n  driver: memory\n"
        )
        .unwrap();
        let cfg = TillerConfig::load(tmpfile.path()).unwrap();
        assert_eq!(cfg.admin.addr, "127.0.0.1:9443");
        assert_eq!(cfg.admin.token.as_deref(), Some("secret"));
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert_eq!(cfg.balancer.driver, BalancerDriver::Memory);
        // Untouched sections keep their defaults
        assert_eq!(cfg.admin.tls_host, "tiller.local");
        assert!(!cfg.observability.prometheus.enabled);
    }

    #[test]
    fn load_yaml_with_tls_paths() {
        let yaml = r#"
admin:
  tls:
    cert: /etc/tiller/cert.pem
    key: /etc/tiller/key.pem
"#;
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "{yaml}").unwrap();
        let cfg = TillerConfig::load(tmpfile.path()).unwrap();
        let tls = cfg.admin.tls.unwrap();
        assert_eq!(tls.cert, PathBuf::from("/etc/tiller/cert.pem"));
        assert_eq!(tls.key, PathBuf::from("/etc/tiller/key.pem"));
    }

    #[test]
    fn unknown_store_backend_is_rejected() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile, "store:\n  backend: postgres\n").unwrap();
        assert!(TillerConfig::load(tmpfile.path()).is_err());
    }
}
