use log::info;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;

use super::ChartError;

#[derive(Deserialize)]
struct UploadResponse {
    data: Option<UploadData>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct UploadData {
    url: String,
}

/// Uploads base64 images to a public host so MMS/RCS carriers can fetch them.
pub struct ImageHost {
    http: HttpClient,
    upload_url: String,
    api_key: String,
}

impl ImageHost {
    pub fn new(upload_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ChartError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            upload_url: upload_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Posts `image` as form field `image` and returns the hosted URL.
    pub async fn upload(&self, image_base64: &str) -> Result<String, ChartError> {
        let form = [
            ("key", self.api_key.as_str()),
            ("image", image_base64),
        ];
        let resp = self.http.post(&self.upload_url).form(&form).send().await?;
        let status = resp.status();
        let parsed: UploadResponse = resp.json().await?;

        match parsed.data {
            Some(data) if status.is_success() && !data.url.is_empty() => {
                info!("Uploaded chart image to {}", data.url);
                Ok(data.url)
            }
            _ => {
                let detail = parsed.error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| format!("HTTP {}", status));
                Err(ChartError::Upload(detail))
            }
        }
    }
}
