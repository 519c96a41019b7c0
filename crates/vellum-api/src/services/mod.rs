pub mod status;
pub mod upload;
