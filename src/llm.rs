use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::{LanguageModel, LlmError};
use crate::config::LlmConfig;

pub const TEMPERATURE: f64 = 0.1;
pub const TOP_P: f64 = 0.9;
pub const NUM_PREDICT: u32 = 512;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaClient {
    http: reqwest::blocking::Client,
    config: LlmConfig,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LlmError::Other(err.to_string()))?;

        Ok(Self { http, config })
    }

    fn classify(&self, err: reqwest::Error) -> LlmError {
        if err.is_connect() {
            LlmError::ConnectionFailed {
                endpoint: self.config.host.clone(),
            }
        } else if err.is_timeout() {
            LlmError::Timeout {
                endpoint: self.config.host.clone(),
                seconds: self.config.timeout.as_secs(),
                detail: err.to_string(),
            }
        } else if err.is_decode() {
            LlmError::MalformedResponse(err.to_string())
        } else {
            LlmError::Other(err.to_string())
        }
    }
}

impl LanguageModel for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = self.config.generate_url();
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: TEMPERATURE,
                top_p: TOP_P,
                num_predict: NUM_PREDICT,
            },
        };

        debug!(%url, model = %self.config.model, prompt_len = prompt.len(), "sending prompt");

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Other(format!("{status} for url: {url}")));
        }

        let body = response.text().map_err(|err| self.classify(err))?;
        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|err| LlmError::MalformedResponse(err.to_string()))?;

        Ok(parsed.response.trim().to_string())
    }
}
