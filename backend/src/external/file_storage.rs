//! File storage client
//!
//! Uploads movement attachments (delivery notes, count sheets) to an external
//! object store and returns where they landed.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::StoredFile;

use crate::error::{AppError, AppResult};

/// A file ready to upload
#[derive(Debug, Clone, Serialize)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    /// Base64 payload as received from the caller
    pub content_base64: String,
    /// Decoded size
    pub size_bytes: i64,
    /// Storage folder, e.g. `movements/<tenant>`
    pub folder: String,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn upload(&self, file: FileUpload) -> AppResult<StoredFile>;
}

/// Response from the upload endpoint
#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
    #[serde(default)]
    size_bytes: Option<i64>,
    #[serde(default)]
    name: Option<String>,
}

/// Client for an HTTP file storage service
#[derive(Clone)]
pub struct HttpFileStorage {
    api_endpoint: String,
    api_key: String,
    http_client: Client,
}

impl HttpFileStorage {
    /// Create a new file storage client
    pub fn new(api_endpoint: String, api_key: String) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            api_endpoint,
            api_key,
            http_client,
        })
    }
}

#[async_trait]
impl FileStorage for HttpFileStorage {
    async fn upload(&self, file: FileUpload) -> AppResult<StoredFile> {
        let response = self
            .http_client
            .post(&self.api_endpoint)
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&file)
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("Upload failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::StorageError(format!(
                "Storage returned {}: {}",
                status, body
            )));
        }

        let result: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to parse response: {}", e)))?;

        Ok(StoredFile {
            url: result.url,
            size_bytes: result.size_bytes.unwrap_or(file.size_bytes),
            name: result.name.unwrap_or(file.file_name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_response_defaults() {
        let parsed: UploadResponse =
            serde_json::from_str(r#"{"url": "https://files.example.com/a.pdf"}"#).unwrap();
        assert_eq!(parsed.url, "https://files.example.com/a.pdf");
        assert!(parsed.size_bytes.is_none());
        assert!(parsed.name.is_none());
    }

    #[test]
    fn test_client_builds() {
        let storage =
            HttpFileStorage::new("http://localhost:9000/upload".to_string(), "key".to_string());
        assert!(storage.is_ok());
    }
}
