//! Malware scanning contract
//!
//! The upload gate only depends on [`MalwareScanner`]. The ClamAV client lives in
//! `vellum-services`; [`SignatureScanner`] is the built-in fallback used when no
//! daemon is configured.

use async_trait::async_trait;

/// EICAR anti-malware test string.
pub const EICAR_SIGNATURE: &[u8] =
    b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

/// Outcome of a completed scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanVerdict {
    pub infected: bool,
    /// Name of the matched signature, empty when clean
    pub signature: String,
}

impl ScanVerdict {
    pub fn clean() -> Self {
        Self {
            infected: false,
            signature: String::new(),
        }
    }

    pub fn infected(signature: impl Into<String>) -> Self {
        Self {
            infected: true,
            signature: signature.into(),
        }
    }
}

/// The scanner could not produce a verdict
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Scanner unreachable: {0}")]
    Unavailable(String),

    #[error("Scan timed out after {0} seconds")]
    Timeout(u64),

    #[error("Unreadable scanner response: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait MalwareScanner: Send + Sync {
    async fn scan(&self, data: &[u8]) -> Result<ScanVerdict, ScanError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// In-process scanner that matches a fixed signature table.
///
/// Only knows the EICAR test pattern, which is enough to exercise the rejection
/// path end to end without a ClamAV daemon.
#[derive(Debug, Clone)]
pub struct SignatureScanner {
    signatures: Vec<(String, Vec<u8>)>,
}

impl Default for SignatureScanner {
    fn default() -> Self {
        Self {
            signatures: vec![("Eicar-Test-Signature".to_string(), EICAR_SIGNATURE.to_vec())],
        }
    }
}

impl SignatureScanner {
    pub fn with_signature(mut self, name: impl Into<String>, pattern: impl Into<Vec<u8>>) -> Self {
        self.signatures.push((name.into(), pattern.into()));
        self
    }

    fn find(&self, data: &[u8]) -> Option<&str> {
        self.signatures.iter().find_map(|(name, pattern)| {
            if pattern.is_empty() || pattern.len() > data.len() {
                return None;
            }
            data.windows(pattern.len())
                .any(|window| window == pattern.as_slice())
                .then_some(name.as_str())
        })
    }
}

#[async_trait]
impl MalwareScanner for SignatureScanner {
    async fn scan(&self, data: &[u8]) -> Result<ScanVerdict, ScanError> {
        match self.find(data) {
            Some(signature) => {
                tracing::warn!(signature = %signature, "Signature scan matched");
                Ok(ScanVerdict::infected(signature))
            }
            None => Ok(ScanVerdict::clean()),
        }
    }

    fn name(&self) -> &'static str {
        "signature"
    }
}
