use starboard_types::card::{Card, CardField, CardFooter, CardImage};
use starboard_types::models::{MessageSnapshot, snowflake_timestamp};
use starboard_types::settings::GuildSettings;

/// Color used in minimal mode.
pub const GRAY: u32 = 0x2E3036;

/// (minimum count, color), highest threshold first.
pub const TIERS: [(u64, u32); 4] = [
    (100, 0x6F29CE),
    (50, 0xFFB549),
    (10, 0xFFB13F),
    (0, 0xFFAC33),
];

/// Localized card labels.
#[derive(Debug, Clone)]
pub struct CardLabels {
    pub title: String,
    pub author: String,
    pub channel: String,
}

pub fn message_url(snapshot: &MessageSnapshot) -> String {
    format!(
        "https://discord.com/channels/{}/{}/{}",
        snapshot.guild_id, snapshot.channel_id, snapshot.id
    )
}

pub fn tier_color(count: u64) -> u32 {
    TIERS
        .iter()
        .find(|(min, _)| count >= *min)
        .map(|(_, color)| *color)
        .unwrap_or(GRAY)
}

/// Render the card for a source message with `count` stars.
pub fn render(
    snapshot: &MessageSnapshot,
    count: u64,
    settings: &GuildSettings,
    labels: &CardLabels,
) -> Card {
    let emoji = &settings.emoji;

    let mut footer = match emoji.icon_url() {
        Some(icon_url) => CardFooter {
            text: count.to_string(),
            icon_url: Some(icon_url),
        },
        None => CardFooter {
            text: format!("{} {}", emoji.unicode, count),
            icon_url: None,
        },
    };

    let mut color = GRAY;
    let mut timestamp = None;

    if !settings.minimal {
        let label = if count == 1 {
            emoji.name.clone()
        } else {
            pluralize(&emoji.name)
        };
        footer.text = format!("{} {}", footer.text, label);
        timestamp = snowflake_timestamp(&snapshot.id).map(|t| t.to_rfc3339());
        color = tier_color(count);
    }

    Card {
        title: labels.title.clone(),
        url: message_url(snapshot),
        description: snapshot.content.clone(),
        color,
        fields: vec![
            CardField {
                name: labels.author.clone(),
                value: format!("<@{}>", snapshot.author_id),
                inline: true,
            },
            CardField {
                name: labels.channel.clone(),
                value: format!("<#{}>", snapshot.channel_id),
                inline: true,
            },
        ],
        footer,
        timestamp,
        image: snapshot.image.clone().map(|url| CardImage { url }),
    }
}

/// English plural of an emoji name.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    pluralizer::pluralize(word, 2, false)
}
