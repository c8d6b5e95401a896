//! Twilio REST implementation of the [`SmsLister`] contract.
//!
//! One GET per number against the message-list resource, filtered server-side
//! by recipient and sent-after date. Credentials double as the basic-auth
//! pair, which is how the provider authenticates API requests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use crate::sources::{CollectError, SmsLister, SmsMessage};

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TwilioSmsClient {
    http: reqwest::Client,
    sid: String,
    token: String,
    base_url: String,
}

#[derive(Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<SmsMessage>,
}

impl TwilioSmsClient {
    pub fn new(sid: String, token: String) -> Self {
        Self::with_base_url(sid, token, DEFAULT_BASE_URL.to_string())
    }

    /// Base-URL override for tests against a local listener.
    pub fn with_base_url(sid: String, token: String, base_url: String) -> Self {
        TwilioSmsClient {
            http: reqwest::Client::new(),
            sid,
            token,
            base_url,
        }
    }
}

#[async_trait]
impl SmsLister for TwilioSmsClient {
    async fn list_messages(
        &self,
        to: &str,
        since: NaiveDate,
    ) -> Result<Vec<SmsMessage>, CollectError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.sid
        );
        let sent_after = since.format("%Y-%m-%d").to_string();
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.sid, Some(&self.token))
            .query(&[("To", to), ("DateSent>", sent_after.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| CollectError::Provider(format!("sms list request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<failed to decode response body>"));
            return Err(CollectError::Provider(format!(
                "sms provider returned status {status}: {body}"
            )));
        }

        let page: MessagePage = response
            .json()
            .await
            .map_err(|e| CollectError::Provider(format!("sms list response unreadable: {e}")))?;
        info!(to = %to, count = page.messages.len(), "Listed SMS messages for number");
        Ok(page.messages)
    }
}
