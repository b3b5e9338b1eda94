use {
    tempfile::NamedTempFile,
    tokio::{fs, io::AsyncWriteExt},
    tracing::debug,
};

use crate::{client::GeminiClient, error::Error, Result};

/// Reference to media the backend has ingested, attachable to a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub uri: String,
    pub mime_type: String,
}

impl GeminiClient {
    /// Stage raw media bytes on disk and upload them to the file API.
    ///
    /// The staging file is removed when this returns, on both the success
    /// and the failure path.
    pub async fn upload_file(&self, bytes: &[u8], mime_type: &str) -> Result<FileHandle> {
        let staged = NamedTempFile::new()?;

        let mut out = fs::File::create(staged.path()).await?;
        out.write_all(bytes).await?;
        out.flush().await?;

        self.upload_staged_file(staged, mime_type).await
    }

    /// Upload an already-staged file, consuming and unlinking it on every
    /// path.
    pub(crate) async fn upload_staged_file(
        &self,
        staged: NamedTempFile,
        mime_type: &str,
    ) -> Result<FileHandle> {
        let result = self.upload_staged(staged.path(), mime_type).await;
        drop(staged);
        result
    }

    async fn upload_staged(&self, path: &std::path::Path, mime_type: &str) -> Result<FileHandle> {
        let payload = fs::read(path).await?;
        let url = format!("{}/upload/v1beta/files", self.base_url());
        debug!(mime_type, size = payload.len(), "uploading media to gemini");

        let resp = self
            .http()
            .post(&url)
            .header("x-goog-api-key", self.api_key())
            .header("X-Goog-Upload-Protocol", "raw")
            .header("content-type", mime_type)
            .body(payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::UploadRejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let uri = body["file"]["uri"]
            .as_str()
            .ok_or_else(|| Error::message("upload response missing file.uri"))?
            .to_string();
        let mime_type = body["file"]["mimeType"]
            .as_str()
            .unwrap_or(mime_type)
            .to_string();

        Ok(FileHandle { uri, mime_type })
    }
}

#[cfg(test)]
mod tests {
    use {secrecy::Secret, serde_json::json};

    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> GeminiClient {
        GeminiClient::with_base_url(Secret::new("test-key".into()), server.url())
    }

    #[tokio::test]
    async fn upload_returns_handle_from_response() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/upload/v1beta/files")
            .match_header("x-goog-upload-protocol", "raw")
            .match_header("content-type", "image/jpeg")
            .with_status(200)
            .with_body(
                json!({
                    "file": {
                        "uri": "https://files.example/abc123",
                        "mimeType": "image/jpeg"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let handle = client
            .upload_file(b"\xff\xd8\xff", "image/jpeg")
            .await
            .unwrap();

        assert_eq!(handle.uri, "https://files.example/abc123");
        assert_eq!(handle.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn rejected_upload_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/upload/v1beta/files")
            .with_status(403)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .upload_file(b"data", "image/jpeg")
            .await
            .unwrap_err();

        match err {
            Error::UploadRejected { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "quota exceeded");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    fn staged_file(bytes: &[u8]) -> NamedTempFile {
        use std::io::Write;
        let mut staged = NamedTempFile::new().unwrap();
        staged.write_all(bytes).unwrap();
        staged.flush().unwrap();
        staged
    }

    #[tokio::test]
    async fn staging_file_is_removed_after_successful_upload() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/upload/v1beta/files")
            .with_status(200)
            .with_body(
                json!({ "file": { "uri": "https://files.example/ok" } }).to_string(),
            )
            .create_async()
            .await;

        let staged = staged_file(b"payload");
        let path = staged.path().to_path_buf();

        let client = client_for(&server);
        client
            .upload_staged_file(staged, "image/jpeg")
            .await
            .unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn staging_file_is_removed_after_rejected_upload() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/upload/v1beta/files")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let staged = staged_file(b"payload");
        let path = staged.path().to_path_buf();

        let client = client_for(&server);
        let err = client
            .upload_staged_file(staged, "image/jpeg")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UploadRejected { status: 429, .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_uri_in_response_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/upload/v1beta/files")
            .with_status(200)
            .with_body(json!({ "file": {} }).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.upload_file(b"data", "image/jpeg").await.unwrap_err();
        assert!(err.to_string().contains("file.uri"));
    }
}
