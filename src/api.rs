use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ArchiveError, Result};
use crate::model::{ConversationItem, Message, Page, UserProfile};

/// The three platform calls the archiver needs once a session exists.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn list_conversations(&self, offset: u32, count: u32) -> Result<Page<ConversationItem>>;

    /// `start_message_id` is inclusive; -1 means "from the latest message".
    async fn get_history(
        &self,
        peer_id: i64,
        start_message_id: i64,
        count: u32,
    ) -> Result<Page<Message>>;

    async fn lookup_user(&self, user_id: i64) -> Result<UserProfile>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

/// `MessagingApi` over the platform's `method/<name>` HTTP endpoints.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    version: String,
}

impl HttpApi {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client,
            base_url,
            access_token: access_token.into(),
            version: version.into(),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, method);
        let mut form: Vec<(&str, String)> = params.to_vec();
        form.push(("access_token", self.access_token.clone()));
        form.push(("v", self.version.clone()));

        debug!(method, "api call");
        let resp = self.client.post(&url).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::Http {
                url,
                status: status.as_u16(),
            });
        }

        let envelope: Envelope<T> = resp.json().await?;
        match (envelope.response, envelope.error) {
            (_, Some(err)) => Err(ArchiveError::Api {
                method: method.to_string(),
                code: err.error_code,
                message: err.error_msg,
            }),
            (Some(response), None) => Ok(response),
            (None, None) => Err(ArchiveError::malformed(format!(
                "{method}: neither response nor error"
            ))),
        }
    }
}

#[async_trait]
impl MessagingApi for HttpApi {
    async fn list_conversations(&self, offset: u32, count: u32) -> Result<Page<ConversationItem>> {
        self.call(
            "messages.getConversations",
            &[("offset", offset.to_string()), ("count", count.to_string())],
        )
        .await
    }

    async fn get_history(
        &self,
        peer_id: i64,
        start_message_id: i64,
        count: u32,
    ) -> Result<Page<Message>> {
        self.call(
            "messages.getHistory",
            &[
                ("offset", "0".to_string()),
                ("count", count.to_string()),
                ("peer_id", peer_id.to_string()),
                ("start_message_id", start_message_id.to_string()),
            ],
        )
        .await
    }

    async fn lookup_user(&self, user_id: i64) -> Result<UserProfile> {
        let users: Vec<UserProfile> = self
            .call("users.get", &[("user_ids", user_id.to_string())])
            .await?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| ArchiveError::malformed(format!("users.get returned no profile for {user_id}")))
    }
}
