use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;

use crate::notifications::Notifier;

/// Posts notifications as plain Discord messages.
pub struct SerenityNotifier {
    http: Arc<Http>,
}

impl SerenityNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for SerenityNotifier {
    async fn send(&self, channel_id: ChannelId, content: String) -> Result<MessageId> {
        let message = channel_id
            .send_message(&*self.http, CreateMessage::new().content(content))
            .await?;
        Ok(message.id)
    }

    async fn delete(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        channel_id.delete_message(&self.http, message_id).await?;
        Ok(())
    }
}
