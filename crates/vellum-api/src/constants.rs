//! API constants

/// API base path prefix (version-independent)
pub const API_BASE: &str = "/api";

/// Current API version
pub const API_VERSION: &str = "v0";

/// Versioned prefix for every route except health checks
pub const API_PREFIX: &str = "/api/v0";

/// Header carrying the authenticated user id, set by the upstream gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Slack on top of the file size ceiling for multipart boundaries and text fields
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matches_base_and_version() {
        assert_eq!(API_PREFIX, format!("{}/{}", API_BASE, API_VERSION));
    }
}
