//! External API integrations

pub mod file_storage;

pub use file_storage::{FileStorage, FileUpload, HttpFileStorage};
