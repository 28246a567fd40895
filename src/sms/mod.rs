//! Outbound SMS delivery for OTP codes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::SmsConfig;
use crate::error::SmsError;

/// Delivery channel seam. Production uses the sms.ir verify API; tests
/// mock this trait or point the client at a local mock server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_code(&self, phone: &str, code: &str) -> Result<(), SmsError>;
}

#[derive(Debug, Serialize)]
struct VerifyPayload<'a> {
    mobile: &'a str,
    #[serde(rename = "templateId")]
    template_id: u32,
    parameters: Vec<TemplateParameter<'a>>,
}

#[derive(Debug, Serialize)]
struct TemplateParameter<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    status: i32,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct SmsIrClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    template_id: u32,
}

impl SmsIrClient {
    pub fn new(config: &SmsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            template_id: config.template_id,
        }
    }
}

#[async_trait]
impl SmsSender for SmsIrClient {
    async fn send_code(&self, phone: &str, code: &str) -> Result<(), SmsError> {
        let payload = VerifyPayload {
            mobile: phone,
            template_id: self.template_id,
            parameters: vec![TemplateParameter { name: "CODE", value: code }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let http_status = response.status();
        if !http_status.is_success() {
            error!("SMS gateway returned HTTP {}", http_status);
            return Err(SmsError::Gateway(format!("HTTP {}", http_status)));
        }

        let body: GatewayResponse = response.json().await?;
        // The gateway reports success as status == 1 in the body.
        if body.status != 1 {
            let message = body.message.unwrap_or_else(|| "Unknown error".to_string());
            error!("SMS gateway rejected message: {}", message);
            return Err(SmsError::Gateway(message));
        }

        info!("OTP delivered to phone: {}", phone);
        Ok(())
    }
}
