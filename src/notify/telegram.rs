//! Telegram Bot API notifier
//!
//! Uses `sendMessage` for the summary and `sendPhoto` (multipart upload)
//! for the capture.

use super::{AlertError, Notifier};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const API_BASE: &str = "https://api.telegram.org";

/// Envelope every Bot API method answers with
#[derive(Debug, Deserialize)]
pub struct TelegramResponse {
    pub ok: bool,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

impl TelegramResponse {
    pub fn into_result(self) -> Result<(), AlertError> {
        if self.ok {
            return Ok(());
        }
        let description = self.description.unwrap_or_else(|| "no description".to_string());
        Err(AlertError::ApiError(match self.error_code {
            Some(code) => format!("{} {}", code, description),
            None => description,
        }))
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Bot client bound to one chat
pub struct TelegramNotifier {
    http_client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Result<Self, AlertError> {
        Ok(Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            api_base: API_BASE.to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    /// Point the client at a different Bot API server
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Replace the HTTP client, e.g. to change timeouts or proxy settings
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn finish(&self, response: reqwest::Response) -> Result<(), AlertError> {
        // The URL carries the bot token; keep it out of errors and logs
        let body: TelegramResponse = response.json().await.map_err(|e| e.without_url())?;
        body.into_result()
    }
}

impl Notifier for TelegramNotifier {
    async fn send_text(&self, text: &str) -> Result<(), AlertError> {
        debug!("Sending message to chat {}", self.chat_id);

        let response = self
            .http_client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            .map_err(|e| e.without_url())?;

        self.finish(response).await
    }

    async fn send_photo(&self, image_path: &Path) -> Result<(), AlertError> {
        debug!("Sending photo {} to chat {}", image_path.display(), self.chat_id);

        let bytes = tokio::fs::read(image_path).await?;
        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "capture.jpg".to_string());

        let photo = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("photo", photo);

        let response = self
            .http_client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| e.without_url())?;

        self.finish(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one request with `reply` and hand back the raw request text
    async fn one_shot_server(reply: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                reply.len(),
                reply
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        (base, handle)
    }

    fn local_notifier(token: &str, chat_id: &str, base: &str) -> TelegramNotifier {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        TelegramNotifier::new(token, chat_id)
            .unwrap()
            .with_http_client(client)
            .with_api_base(base)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        request.len() >= header_end + 4 + length
    }

    #[test]
    fn test_error_envelope_maps_to_api_error() {
        let response: TelegramResponse =
            serde_json::from_str(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
                .unwrap();

        match response.into_result() {
            Err(AlertError::ApiError(msg)) => assert_eq!(msg, "400 Bad Request: chat not found"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_ok_envelope() {
        let response: TelegramResponse =
            serde_json::from_str(r#"{"ok":true,"result":{"message_id":7}}"#).unwrap();
        assert!(response.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_send_text_posts_to_bot_method() {
        let (base, server) = one_shot_server(r#"{"ok":true,"result":{}}"#).await;
        let notifier = local_notifier("123:abc", "-1001", &base);

        notifier.send_text("Detected: person").await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /bot123:abc/sendMessage "));
        assert!(request.contains(r#""chat_id":"-1001""#));
        assert!(request.contains(r#""text":"Detected: person""#));
    }

    #[tokio::test]
    async fn test_send_photo_uploads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let image = tmp.path().join("detected_20240101_120000.jpg");
        std::fs::write(&image, b"JPEGBYTES").unwrap();

        let (base, server) = one_shot_server(r#"{"ok":true,"result":{}}"#).await;
        let notifier = local_notifier("123:abc", "42", &base);

        notifier.send_photo(&image).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /bot123:abc/sendPhoto "));
        assert!(request.contains(r#"name="photo"; filename="detected_20240101_120000.jpg""#));
        assert!(request.contains("JPEGBYTES"));
    }

    #[tokio::test]
    async fn test_rejected_send_is_api_error() {
        let (base, server) =
            one_shot_server(r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#).await;
        let notifier = local_notifier("bad", "42", &base);

        let err = notifier.send_text("hello").await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, AlertError::ApiError(ref msg) if msg == "401 Unauthorized"));
    }

    #[tokio::test]
    async fn test_missing_photo_is_file_error() {
        let notifier = TelegramNotifier::new("t", "42").unwrap();
        let err = notifier.send_photo(Path::new("/nonexistent/detected.jpg")).await.unwrap_err();
        assert!(matches!(err, AlertError::FileError(_)));
    }
}
