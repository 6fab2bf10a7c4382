pub mod blob_service;
pub mod mime;
pub mod paths;
