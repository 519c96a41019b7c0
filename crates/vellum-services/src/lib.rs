//! Vellum Services Layer
//!
//! Adapters to external services the pipeline consumes, and the factory that
//! picks between them from configuration.

#[cfg(feature = "clamav")]
pub mod clamav;

#[cfg(feature = "clamav")]
pub use clamav::ClamAvScanner;

use anyhow::Result;
use std::sync::Arc;
use vellum_core::Config;
use vellum_processing::{MalwareScanner, SignatureScanner};

/// Build the malware scanner selected by `CLAMAV_ENABLED`.
///
/// Fails when ClamAV is requested but this build cannot talk to it, so uploads are
/// never accepted with weaker scanning than configured.
pub fn create_scanner(config: &Config) -> Result<Arc<dyn MalwareScanner>> {
    if config.clamav_enabled {
        return clamav_scanner(config);
    }

    tracing::info!("Using built-in signature scanner");
    Ok(Arc::new(SignatureScanner::default()))
}

#[cfg(feature = "clamav")]
fn clamav_scanner(config: &Config) -> Result<Arc<dyn MalwareScanner>> {
    tracing::info!(
        host = %config.clamav_host,
        port = config.clamav_port,
        "Using ClamAV malware scanner"
    );
    Ok(Arc::new(ClamAvScanner::with_timeout(
        config.clamav_host.clone(),
        config.clamav_port,
        config.clamav_timeout_secs,
    )))
}

#[cfg(not(feature = "clamav"))]
fn clamav_scanner(_config: &Config) -> Result<Arc<dyn MalwareScanner>> {
    Err(anyhow::anyhow!(
        "CLAMAV_ENABLED=true but this build was compiled without the clamav feature"
    ))
}
