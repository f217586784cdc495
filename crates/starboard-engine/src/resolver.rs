use tracing::debug;

use starboard_types::models::PlatformChannel;
use starboard_types::settings::{GuildSettings, MirrorChannel};

use crate::platform::ChatPlatform;

/// Name a channel must carry to be picked up as a guild's default.
pub const DEFAULT_CHANNEL_NAME: &str = "starboard";

/// The channel cards for messages in `channel_id` go to, or `None` when
/// mirroring is disabled there. Lookup failures count as disabled.
pub async fn resolve_mirror_channel(
    platform: &dyn ChatPlatform,
    settings: &GuildSettings,
    guild_id: &str,
    channel_id: &str,
) -> Option<String> {
    let source = match platform.fetch_channel(channel_id).await {
        Ok(c) => c,
        Err(e) => {
            debug!(channel_id, "Source channel lookup failed: {}", e);
            return None;
        }
    };

    match settings.mirror_channel(source.nsfw) {
        MirrorChannel::Disabled => None,
        MirrorChannel::Channel(id) => Some(id.clone()),
        MirrorChannel::Default => {
            let channels = match platform.fetch_guild_channels(guild_id).await {
                Ok(c) => c,
                Err(e) => {
                    debug!(guild_id, "Guild channel lookup failed: {}", e);
                    return None;
                }
            };

            find_default_channel(&channels, source.nsfw).map(|c| c.id.clone())
        }
    }
}

/// First text channel by position named like a starboard. For sensitive
/// sources the candidate must itself be marked NSFW.
pub fn find_default_channel(channels: &[PlatformChannel], nsfw: bool) -> Option<&PlatformChannel> {
    channels
        .iter()
        .filter(|c| c.is_text())
        .filter(|c| c.name.as_deref() == Some(DEFAULT_CHANNEL_NAME))
        .filter(|c| !nsfw || c.nsfw)
        .min_by_key(|c| c.position)
}
