//! Discord notification sink - posts lifecycle messages into one channel.

use super::notifier::NotificationSink;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, Http};

/// Sends each notification as a plain message to a configured Discord channel.
pub struct DiscordSink {
    http: Http,
    channel: ChannelId,
}

impl DiscordSink {
    /// Builds a sink from a bot token and a channel id.
    ///
    /// # Errors
    /// Returns `Error::Config` if `channel_id` is 0.
    pub fn new(token: &str, channel_id: u64) -> Result<Self> {
        if channel_id == 0 {
            return Err(Error::Config {
                message: "Discord channel id cannot be 0".to_string(),
            });
        }
        Ok(Self {
            http: Http::new(token),
            channel: ChannelId::new(channel_id),
        })
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn send(&self, message: &str) -> Result<()> {
        self.channel
            .say(&self.http, message)
            .await
            .map_err(|e| Error::Notification {
                message: e.to_string(),
            })?;
        Ok(())
    }
}
