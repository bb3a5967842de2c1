//! Certificate material for the admin listener.

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use rcgen::{CertifiedKey, generate_simple_self_signed};
use tiller_core::config::AdminConfig;
use tracing::info;

/// Resolve the listener's TLS setup: the configured PEM pair, else a freshly
/// generated self-signed certificate, else `None` for plain HTTP.
pub async fn rustls_config(config: &AdminConfig) -> anyhow::Result<Option<RustlsConfig>> {
    if let Some(ref tls) = config.tls {
        let rustls = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
            .await
            .with_context(|| {
                format!(
                    "failed to load admin certificate {} / {}",
                    tls.cert.display(),
                    tls.key.display()
                )
            })?;
        info!(cert = %tls.cert.display(), "Loaded admin TLS certificate");
        return Ok(Some(rustls));
    }

    if !config.self_signed {
        return Ok(None);
    }

    let (cert, key) = self_signed(&config.tls_host)?;
    let rustls = RustlsConfig::from_pem(cert.into_bytes(), key.into_bytes())
        .await
        .context("failed to load generated admin certificate")?;
    info!(host = %config.tls_host, "Generated self-signed admin certificate");
    Ok(Some(rustls))
}

/// PEM-encoded certificate and private key for `host`.
pub fn self_signed(host: &str) -> anyhow::Result<(String, String)> {
    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(vec![host.to_string()])
        .context("failed to generate self-signed certificate")?;
    Ok((cert.pem(), key_pair.serialize_pem()))
}
