//! HTTP client for the chat gateway's outbound API.

use std::time::Duration;

use {
    async_trait::async_trait,
    serde::{Deserialize, de::DeserializeOwned},
    serde_json::{Value, json},
    tracing::debug,
    url::Url,
};

use {
    wxhook_config::GatewayConfig,
    wxhook_messages::{AttachmentResolver, MediaKind, MessageSender},
};

use crate::error::{Context, Error, Result};

/// Header carrying the API token.
pub const TOKEN_HEADER: &str = "X-GEWE-TOKEN";

/// `ret` value of a successful call.
const RET_OK: i64 = 200;

/// Downloads expect the full-size original rather than a thumbnail.
const IMAGE_ORIGINAL: i64 = 2;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ret: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadData {
    file_url: String,
}

/// Thin wrapper over the gateway's JSON-over-POST API.
///
/// Implements both [`AttachmentResolver`] and [`MessageSender`], so one
/// instance can be injected into the dispatcher and into plugins.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
    app_id: String,
}

impl HttpGateway {
    pub fn new(base_url: &str, token: Option<String>, app_id: impl Into<String>) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), base_url, token, app_id)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        token: Option<String>,
        app_id: impl Into<String>,
    ) -> Result<Self> {
        // Joined paths replace the last segment unless the base ends in '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized).map_err(|source| Error::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        Ok(Self {
            client,
            base,
            token,
            app_id: app_id.into(),
        })
    }

    /// Build from config. `Ok(None)` when no base URL is configured.
    pub fn from_config(config: &GatewayConfig) -> Result<Option<Self>> {
        let Some(base_url) = config.base_url.as_deref() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Self::with_client(
            client,
            base_url,
            config.token().map(str::to_string),
            config.app_id.clone().unwrap_or_default(),
        )
        .map(Some)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|source| Error::InvalidUrl {
            url: path.to_string(),
            source,
        })
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<Option<T>> {
        let url = self.endpoint(path)?;
        debug!(%url, "gateway request");
        let mut request = self.client.post(url).json(&body);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        let response = request
            .send()
            .await?
            .error_for_status()?
            .json::<ApiResponse<T>>()
            .await?;
        if response.ret != RET_OK {
            return Err(Error::Message {
                message: format!("{path} returned {}: {}", response.ret, response.msg),
            });
        }
        Ok(response.data)
    }

    fn download_request(
        &self,
        kind: MediaKind,
        markup: &str,
        message_id: &str,
    ) -> (&'static str, Value) {
        let mut body = json!({
            "appId": self.app_id,
            "xml": markup,
        });
        let path = match kind {
            MediaKind::Image => {
                body["type"] = json!(IMAGE_ORIGINAL);
                "message/downloadImage"
            },
            MediaKind::Voice => {
                body["msgId"] = json!(message_id.parse::<i64>().unwrap_or_default());
                "message/downloadVoice"
            },
            MediaKind::Video => "message/downloadVideo",
            MediaKind::File => "message/downloadFile",
        };
        (path, body)
    }

    /// Ask the gateway for a download URL for the attachment in `markup`.
    pub async fn download_url(
        &self,
        kind: MediaKind,
        markup: &str,
        message_id: &str,
    ) -> Result<String> {
        let (path, body) = self.download_request(kind, markup, message_id);
        self.call::<DownloadData>(path, body)
            .await?
            .map(|d| d.file_url)
            .filter(|url| !url.is_empty())
            .with_context(|| format!("{path} returned no file URL"))
    }

    /// Send a text message, mentioning `at` when sent to a group.
    pub async fn post_text(&self, to: &str, text: &str, at: &[String]) -> Result<()> {
        let mut body = json!({
            "appId": self.app_id,
            "toWxid": to,
            "content": text,
        });
        if !at.is_empty() {
            body["ats"] = Value::String(at.join(","));
        }
        self.call::<Value>("message/postText", body).await?;
        Ok(())
    }
}

#[async_trait]
impl AttachmentResolver for HttpGateway {
    async fn resolve(
        &self,
        kind: MediaKind,
        markup: &str,
        message_id: &str,
    ) -> anyhow::Result<String> {
        Ok(self.download_url(kind, markup, message_id).await?)
    }
}

#[async_trait]
impl MessageSender for HttpGateway {
    async fn send_text(&self, to: &str, text: &str, at: &[String]) -> anyhow::Result<()> {
        Ok(self.post_text(to, text, at).await?)
    }
}
