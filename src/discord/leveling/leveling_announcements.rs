use crate::core::leveling::{Notifier, NotifyError};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Posts level-up messages in the channel where the member leveled up.
pub struct ChannelAnnouncer {
    http: Arc<serenity::Http>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for ChannelAnnouncer {
    async fn notify(&self, channel_id: u64, text: &str) -> Result<(), NotifyError> {
        serenity::ChannelId::new(channel_id)
            .say(self.http.as_ref(), text)
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::warn!(channel_id, "Failed to send level-up message: {e}");
                NotifyError(e.to_string())
            })
    }
}
