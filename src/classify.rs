//! Image classification over HTTP.
//!
//! Posts the image as a multipart form with a single `file` part and reads
//! the label from the `classification` field of the JSON reply.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::capture::ImageBlob;
use crate::config::ClassifierConfig;
use crate::upstream::{self, UpstreamError};

const SERVICE: &str = "classifier";

#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Return a free-form label for the image.
    async fn classify(&self, image: &ImageBlob) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    classification: Option<String>,
}

pub struct HttpClassifier {
    config: ClassifierConfig,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            client: upstream::client(config.timeout_secs)?,
        })
    }
}

fn image_form(image: &ImageBlob) -> Result<Form> {
    let part = Part::bytes(image.bytes.clone())
        .file_name(image.file_name.clone())
        .mime_str(&image.mime)?;
    Ok(Form::new().part("file", part))
}

#[async_trait]
impl ImageClassifier for HttpClassifier {
    async fn classify(&self, image: &ImageBlob) -> Result<String> {
        let api_key = upstream::api_key(&self.config.api_key_env)?;

        let response = upstream::send_with_retry(SERVICE, self.config.max_retries, || {
            Ok(self
                .client
                .post(&self.config.endpoint)
                .bearer_auth(&api_key)
                .multipart(image_form(image)?))
        })
        .await?;

        let parsed: ClassifyResponse =
            response
                .json()
                .await
                .map_err(|e| UpstreamError::InvalidResponse {
                    service: SERVICE,
                    reason: e.to_string(),
                })?;

        parsed.classification.ok_or_else(|| {
            UpstreamError::InvalidResponse {
                service: SERVICE,
                reason: "missing classification field".to_string(),
            }
            .into()
        })
    }
}
