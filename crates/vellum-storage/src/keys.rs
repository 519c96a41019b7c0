//! Shared key generation for storage backends.
//!
//! Keys are built only from UUIDs and enumerated names, never from user-supplied
//! filenames, so they cannot collide across owners or escape their prefix.

use uuid::Uuid;
use vellum_core::{ImageFormatKind, VariantClass};

use crate::{StorageError, StorageResult};

/// Key of the original upload: `originals/{owner_id}/{image_id}.{ext}`.
pub fn original_key(owner_id: Uuid, image_id: Uuid, format: ImageFormatKind) -> String {
    format!("originals/{}/{}.{}", owner_id, image_id, format.extension())
}

/// Key of one rendition: `variants/{owner_id}/{image_id}/{class}.{ext}`.
///
/// Deterministic per image and class, so a retried job overwrites instead of duplicating.
pub fn variant_key(
    owner_id: Uuid,
    image_id: Uuid,
    class: VariantClass,
    format: ImageFormatKind,
) -> String {
    format!(
        "variants/{}/{}/{}.{}",
        owner_id,
        image_id,
        class.as_str(),
        format.extension()
    )
}

/// Reject keys that could address anything outside the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.contains("..")
        || key.contains('\\')
        || key.contains('\0')
        || key.starts_with('/')
    {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_key_layout() {
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();
        let key = original_key(owner, id, ImageFormatKind::Jpeg);
        assert_eq!(key, format!("originals/{}/{}.jpg", owner, id));
        assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn test_variant_key_is_deterministic() {
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();
        let a = variant_key(owner, id, VariantClass::Medium, ImageFormatKind::Webp);
        let b = variant_key(owner, id, VariantClass::Medium, ImageFormatKind::Webp);
        assert_eq!(a, b);
        assert!(a.ends_with("/medium.webp"));
        assert_ne!(
            a,
            variant_key(owner, id, VariantClass::Large, ImageFormatKind::Webp)
        );
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("originals/../../x").is_err());
        assert!(validate_key("/absolute").is_err());
        assert!(validate_key("a\\b").is_err());
        assert!(validate_key("").is_err());
    }
}
