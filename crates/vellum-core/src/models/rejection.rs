use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Why an upload was refused at the validation gate.
///
/// The snake_case code is part of the public API: clients branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    TooLarge,
    UnsupportedFormat,
    DimensionsExceeded,
    PixelCountExceeded,
    MalwareDetected,
    DecodeFailed,
}

impl RejectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionReason::TooLarge => "too_large",
            RejectionReason::UnsupportedFormat => "unsupported_format",
            RejectionReason::DimensionsExceeded => "dimensions_exceeded",
            RejectionReason::PixelCountExceeded => "pixel_count_exceeded",
            RejectionReason::MalwareDetected => "malware_detected",
            RejectionReason::DecodeFailed => "decode_failed",
        }
    }
}

impl Display for RejectionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
