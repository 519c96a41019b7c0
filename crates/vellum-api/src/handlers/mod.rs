pub mod image_status;
pub mod image_upload;
