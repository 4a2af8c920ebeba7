//! Per-message reply capability.
//!
//! A [`Context`] is bound when a [`Message`](crate::Message) is built and
//! never changes afterwards. It holds a weak handle to the gateway plus the
//! channel identity the message came from, so handlers can answer without
//! knowing which route or target to use.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::frame::{ChannelType, MessageType};
use crate::gateway::{Gateway, Method};

/// Options for [`Context::send`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Message type of the outgoing message.
    pub kind: MessageType,
    /// Message id to quote.
    pub quote: Option<String>,
    /// Make the message visible only to this user (channel messages only).
    pub temp_target_id: Option<String>,
    /// Client nonce; generated when absent.
    pub nonce: Option<String>,
}

impl SendOptions {
    /// Sets the message type.
    pub fn kind(mut self, kind: MessageType) -> Self {
        self.kind = kind;
        self
    }

    /// Quotes a message.
    pub fn quote(mut self, msg_id: impl Into<String>) -> Self {
        self.quote = Some(msg_id.into());
        self
    }

    /// Restricts visibility to one user.
    pub fn temp_target(mut self, user_id: impl Into<String>) -> Self {
        self.temp_target_id = Some(user_id.into());
        self
    }

    /// Sets an explicit nonce.
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

/// Result of a successful send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendReceipt {
    /// Id of the created message.
    pub msg_id: String,
    /// Server timestamp (ms).
    pub msg_timestamp: i64,
    /// Nonce echoed back.
    pub nonce: String,
}

/// Reply capability bound to the origin of one message.
#[derive(Debug, Clone)]
pub struct Context {
    gateway: Weak<Gateway>,
    channel_type: ChannelType,
    channel_id: String,
    author_id: String,
    msg_id: String,
    guild_id: Option<String>,
}

impl Context {
    /// Binds a context to a gateway and a message origin.
    pub fn new(
        gateway: Weak<Gateway>,
        channel_type: ChannelType,
        channel_id: impl Into<String>,
        author_id: impl Into<String>,
        msg_id: impl Into<String>,
        guild_id: Option<String>,
    ) -> Self {
        Self {
            gateway,
            channel_type,
            channel_id: channel_id.into(),
            author_id: author_id.into(),
            msg_id: msg_id.into(),
            guild_id,
        }
    }

    /// A context not attached to any gateway; every call yields `NotConnected`.
    pub fn detached(channel_type: ChannelType, channel_id: &str, author_id: &str) -> Self {
        Self::new(Weak::new(), channel_type, channel_id, author_id, "", None)
    }

    /// Channel type of the origin.
    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    /// Channel id (for private chats, the recipient id as reported by the platform).
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Author of the originating message.
    pub fn author_id(&self) -> &str {
        &self.author_id
    }

    /// Originating message id.
    pub fn msg_id(&self) -> &str {
        &self.msg_id
    }

    /// Guild of the origin, if any.
    pub fn guild_id(&self) -> Option<&str> {
        self.guild_id.as_deref()
    }

    /// Returns `true` while the gateway is still alive.
    pub fn is_connected(&self) -> bool {
        self.gateway.strong_count() > 0
    }

    fn gateway(&self) -> ApiResult<Arc<Gateway>> {
        self.gateway.upgrade().ok_or(ApiError::NotConnected)
    }

    fn is_private(&self) -> bool {
        self.channel_type == ChannelType::Person
    }

    /// Route and target parameter for this origin.
    fn route(&self, action: &str) -> (String, Value) {
        if self.is_private() {
            (
                format!("direct-message/{action}"),
                json!({ "target_id": self.author_id }),
            )
        } else {
            (
                format!("message/{action}"),
                json!({ "target_id": self.channel_id }),
            )
        }
    }

    /// Sends a message to the origin channel (or private chat).
    pub async fn send(&self, content: impl Into<String>, options: SendOptions) -> ApiResult<SendReceipt> {
        let gateway = self.gateway()?;
        let nonce = options
            .nonce
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let (route, mut params) = self.route("create");
        params["type"] = json!(options.kind.code());
        params["content"] = json!(content.into());
        params["nonce"] = json!(nonce);
        if let Some(quote) = options.quote {
            params["quote"] = json!(quote);
        }
        if let Some(temp) = options.temp_target_id
            && !self.is_private()
        {
            params["temp_target_id"] = json!(temp);
        }

        let data = gateway.request(Method::Post, &route, params).await?;
        let mut receipt: SendReceipt = serde_json::from_value(data).map_err(|e| ApiError::Decode {
            route: route.clone(),
            reason: e.to_string(),
        })?;
        if receipt.nonce.is_empty() {
            receipt.nonce = nonce;
        }
        Ok(receipt)
    }

    /// Sends a message quoting the originating message.
    pub async fn reply(&self, content: impl Into<String>) -> ApiResult<SendReceipt> {
        let options = SendOptions::default().quote(self.msg_id.clone());
        self.send(content, options).await
    }

    /// Sends a message only the author can see.
    pub async fn send_temporary(&self, content: impl Into<String>) -> ApiResult<SendReceipt> {
        let options = SendOptions::default().temp_target(self.author_id.clone());
        self.send(content, options).await
    }

    /// Adds a reaction to the originating message.
    pub async fn add_reaction(&self, emoji: &str) -> ApiResult<()> {
        let gateway = self.gateway()?;
        let route = if self.is_private() {
            "direct-message/add-reaction"
        } else {
            "message/add-reaction"
        };
        gateway
            .request(
                Method::Post,
                route,
                json!({ "msg_id": self.msg_id, "emoji": emoji }),
            )
            .await?;
        Ok(())
    }

    /// Deletes the originating message.
    pub async fn delete(&self) -> ApiResult<()> {
        let gateway = self.gateway()?;
        let route = if self.is_private() {
            "direct-message/delete"
        } else {
            "message/delete"
        };
        gateway
            .request(Method::Post, route, json!({ "msg_id": self.msg_id }))
            .await?;
        Ok(())
    }

    /// Replaces the content of the originating message.
    pub async fn update(&self, content: impl Into<String>) -> ApiResult<()> {
        let gateway = self.gateway()?;
        let route = if self.is_private() {
            "direct-message/update"
        } else {
            "message/update"
        };
        gateway
            .request(
                Method::Post,
                route,
                json!({ "msg_id": self.msg_id, "content": content.into() }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportResult;
    use crate::gateway::{EventSender, Receiver, Requester};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(Method, String, Value)>>,
    }

    #[async_trait]
    impl Requester for Recorder {
        async fn request(&self, method: Method, route: &str, params: Value) -> ApiResult<Value> {
            self.calls.lock().push((method, route.to_string(), params));
            Ok(json!({"msg_id": "new", "msg_timestamp": 1}))
        }

        async fn request_raw(&self, _: Method, _: &str, _: Value) -> ApiResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    struct Idle;

    #[async_trait]
    impl Receiver for Idle {
        fn name(&self) -> &'static str {
            "idle"
        }

        async fn start(&self, _: EventSender, cancel: CancellationToken) -> TransportResult<()> {
            cancel.cancelled().await;
            Ok(())
        }
    }

    fn gateway(recorder: Arc<Recorder>) -> Arc<Gateway> {
        Gateway::new(Arc::new(Idle), recorder)
    }

    #[tokio::test]
    async fn reply_quotes_origin_in_channel() {
        let recorder = Arc::new(Recorder::default());
        let gw = gateway(recorder.clone());
        let ctx = Context::new(
            Arc::downgrade(&gw),
            ChannelType::Group,
            "chan",
            "user",
            "m1",
            Some("g".into()),
        );

        let receipt = ctx.reply("hi").await.unwrap();
        assert_eq!(receipt.msg_id, "new");
        assert!(!receipt.nonce.is_empty());

        let calls = recorder.calls.lock();
        let (method, route, params) = &calls[0];
        assert_eq!(*method, Method::Post);
        assert_eq!(route, "message/create");
        assert_eq!(params["target_id"], "chan");
        assert_eq!(params["quote"], "m1");
        assert_eq!(params["type"], 1);
    }

    #[tokio::test]
    async fn private_send_targets_author() {
        let recorder = Arc::new(Recorder::default());
        let gw = gateway(recorder.clone());
        let ctx = Context::new(
            Arc::downgrade(&gw),
            ChannelType::Person,
            "bot",
            "user",
            "m1",
            None,
        );

        ctx.send_temporary("psst").await.unwrap();
        let calls = recorder.calls.lock();
        let (_, route, params) = &calls[0];
        assert_eq!(route, "direct-message/create");
        assert_eq!(params["target_id"], "user");
        assert!(params.get("temp_target_id").is_none());
    }

    #[tokio::test]
    async fn dropped_gateway_is_not_connected() {
        let recorder = Arc::new(Recorder::default());
        let gw = gateway(recorder);
        let ctx = Context::new(Arc::downgrade(&gw), ChannelType::Group, "c", "u", "m", None);
        drop(gw);

        assert!(!ctx.is_connected());
        assert!(matches!(ctx.reply("x").await, Err(ApiError::NotConnected)));
    }
}
