use async_trait::async_trait;
use clamav_client::{clean, Tcp};
use std::str;
use std::time::{Duration, Instant};
use vellum_processing::{MalwareScanner, ScanError, ScanVerdict};

/// ClamAV daemon client. Every failure is reported as an error so the upload
/// gate can fail closed.
#[derive(Clone)]
pub struct ClamAvScanner {
    host: String,
    port: u16,
    /// Timeout in seconds for each scan operation (default: 30)
    timeout_secs: u64,
}

impl ClamAvScanner {
    /// # Arguments
    /// * `host` - ClamAV daemon hostname
    /// * `port` - ClamAV daemon port (typically 3310)
    pub fn new(host: String, port: u16) -> Self {
        Self::with_timeout(host, port, 30)
    }

    /// Create with a custom scan timeout (for large files or slow ClamAV instances).
    pub fn with_timeout(host: String, port: u16, timeout_secs: u64) -> Self {
        Self {
            host,
            port,
            timeout_secs,
        }
    }
}

/// Pull the signature name out of a `stream: Eicar-Test-Signature FOUND` reply
fn parse_virus_name(response: &[u8]) -> String {
    let response = str::from_utf8(response).map(str::trim).unwrap_or("unknown");
    if !response.contains("FOUND") {
        return "unknown".to_string();
    }
    response
        .split(':')
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("unknown")
        .to_string()
}

#[async_trait]
impl MalwareScanner for ClamAvScanner {
    /// Runs the sync client inside spawn_blocking to avoid !Send tokio futures.
    async fn scan(&self, data: &[u8]) -> Result<ScanVerdict, ScanError> {
        let start = Instant::now();
        tracing::debug!(host = %self.host, port = %self.port, "Starting ClamAV scan");
        let data = data.to_vec();
        let address = format!("{}:{}", self.host, self.port);

        let result = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            tokio::task::spawn_blocking(move || -> Result<ScanVerdict, ScanError> {
                let connection = Tcp {
                    host_address: address.as_str(),
                };
                let response = clamav_client::scan_buffer(data.as_slice(), connection, None)
                    .map_err(|e| ScanError::Unavailable(e.to_string()))?;
                let is_clean = clean(&response).map_err(|e| ScanError::Protocol(e.to_string()))?;
                Ok(if is_clean {
                    ScanVerdict::clean()
                } else {
                    ScanVerdict::infected(parse_virus_name(&response))
                })
            }),
        )
        .await;

        let verdict = match result {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => Err(ScanError::Unavailable(format!("scan task failed: {}", e))),
            Err(_) => Err(ScanError::Timeout(self.timeout_secs)),
        };

        match &verdict {
            Ok(v) if v.infected => tracing::warn!(
                duration_ms = start.elapsed().as_millis(),
                virus = %v.signature,
                "File scan detected virus"
            ),
            Ok(_) => tracing::info!(
                duration_ms = start.elapsed().as_millis(),
                "File scan completed: clean"
            ),
            Err(e) => tracing::error!(error = %e, "ClamAV scan failed"),
        }

        verdict
    }

    fn name(&self) -> &'static str {
        "clamav"
    }
}
