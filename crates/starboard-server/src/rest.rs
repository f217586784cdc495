//! REST client for the chat platform.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use starboard_engine::cache::TtlCache;
use starboard_engine::platform::{ChatPlatform, PlatformError};
use starboard_types::card::Card;
use starboard_types::models::{GuildMember, Permission, PlatformChannel, PlatformMessage, PlatformUser};
use starboard_types::settings::Emoji;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Computed channel permissions are reused for this long.
const PERMISSION_TTL: Duration = Duration::from_secs(5 * 60);

/// Most ids the bulk delete endpoint accepts per call.
const BULK_DELETE_LIMIT: usize = 100;

const ADMINISTRATOR: u64 = 1 << 3;

pub struct DiscordRest {
    http: Client,
    base: Url,
    token: String,
    user_id: String,
    permissions: TtlCache<u64>,
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Role {
    id: String,
    permissions: String,
}

#[derive(Debug, Deserialize)]
struct MemberRoles {
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Overwrite {
    id: String,
    /// 0 = role, 1 = member
    #[serde(rename = "type")]
    kind: u8,
    allow: String,
    deny: String,
}

#[derive(Debug, Deserialize)]
struct ChannelOverwrites {
    guild_id: Option<String>,
    #[serde(default)]
    permission_overwrites: Vec<Overwrite>,
}

impl DiscordRest {
    /// Build the client and look up the account the token belongs to.
    pub async fn connect(api_base: &str, token: &str) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base = Url::parse(api_base)?;

        let mut rest = Self {
            http,
            base,
            token: token.to_string(),
            user_id: String::new(),
            permissions: TtlCache::new(PERMISSION_TTL),
        };

        let me: PlatformUser = rest.get(&["users", "@me"]).await?;
        info!(user_id = %me.id, "Authenticated with chat platform");
        rest.user_id = me.id;
        Ok(rest)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PlatformError::Transport(format!("invalid API base {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, PlatformError> {
        Ok(self
            .http
            .request(method, self.url(segments)?)
            .header(header::AUTHORIZATION, format!("Bot {}", self.token)))
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, PlatformError> {
        let resp = req
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => PlatformError::NotFound,
            StatusCode::FORBIDDEN => PlatformError::Forbidden,
            _ => PlatformError::Http {
                status: status.as_u16(),
                body,
            },
        })
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, PlatformError> {
        resp.json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, PlatformError> {
        let resp = self.send(self.request(Method::GET, segments)?).await?;
        Self::decode(resp).await
    }

    async fn post_message(&self, channel_id: &str, body: serde_json::Value) -> Result<String, PlatformError> {
        let req = self
            .request(Method::POST, &["channels", channel_id, "messages"])?
            .json(&body);
        let created: CreatedMessage = Self::decode(self.send(req).await?).await?;
        Ok(created.id)
    }

    async fn channel_permissions(&self, channel_id: &str) -> Result<u64, PlatformError> {
        if let Some(bits) = self.permissions.get(channel_id) {
            return Ok(bits);
        }

        let channel: ChannelOverwrites = self.get(&["channels", channel_id]).await?;
        let Some(guild_id) = channel.guild_id else {
            return Ok(0);
        };

        let roles: Vec<Role> = self.get(&["guilds", guild_id.as_str(), "roles"]).await?;
        let member: MemberRoles = self
            .get(&["guilds", guild_id.as_str(), "members", self.user_id.as_str()])
            .await?;

        let bits = compute_permissions(
            &guild_id,
            &self.user_id,
            &roles,
            &member.roles,
            &channel.permission_overwrites,
        );
        self.permissions.set(channel_id, bits);
        Ok(bits)
    }
}

fn parse_bits(raw: &str) -> u64 {
    raw.parse().unwrap_or(0)
}

/// Effective permissions of a member in a channel: guild roles first, then
/// the channel's overwrites for @everyone, the member's roles, and the member.
fn compute_permissions(
    guild_id: &str,
    user_id: &str,
    roles: &[Role],
    member_roles: &[String],
    overwrites: &[Overwrite],
) -> u64 {
    let mut bits = roles
        .iter()
        .filter(|r| r.id == guild_id || member_roles.contains(&r.id))
        .fold(0, |acc, r| acc | parse_bits(&r.permissions));

    if bits & ADMINISTRATOR != 0 {
        return u64::MAX;
    }

    if let Some(everyone) = overwrites.iter().find(|o| o.id == guild_id) {
        bits &= !parse_bits(&everyone.deny);
        bits |= parse_bits(&everyone.allow);
    }

    let (allow, deny) = overwrites
        .iter()
        .filter(|o| o.kind == 0 && o.id != guild_id && member_roles.contains(&o.id))
        .fold((0, 0), |(a, d), o| (a | parse_bits(&o.allow), d | parse_bits(&o.deny)));
    bits &= !deny;
    bits |= allow;

    if let Some(own) = overwrites.iter().find(|o| o.kind == 1 && o.id == user_id) {
        bits &= !parse_bits(&own.deny);
        bits |= parse_bits(&own.allow);
    }

    bits
}

#[async_trait]
impl ChatPlatform for DiscordRest {
    fn current_user_id(&self) -> &str {
        &self.user_id
    }

    async fn send_card(&self, channel_id: &str, card: &Card) -> Result<String, PlatformError> {
        self.post_message(channel_id, json!({ "embeds": [card] })).await
    }

    async fn edit_card(&self, channel_id: &str, card_id: &str, card: &Card) -> Result<(), PlatformError> {
        let req = self
            .request(Method::PATCH, &["channels", channel_id, "messages", card_id])?
            .json(&json!({ "embeds": [card] }));
        self.send(req).await?;
        Ok(())
    }

    async fn delete_card(&self, channel_id: &str, card_id: &str) -> Result<(), PlatformError> {
        let req = self.request(Method::DELETE, &["channels", channel_id, "messages", card_id])?;
        self.send(req).await?;
        Ok(())
    }

    async fn bulk_delete_cards(&self, channel_id: &str, card_ids: &[String]) -> Result<(), PlatformError> {
        for chunk in card_ids.chunks(BULK_DELETE_LIMIT) {
            if let [single] = chunk {
                self.delete_card(channel_id, single).await?;
                continue;
            }

            let req = self
                .request(Method::POST, &["channels", channel_id, "messages", "bulk-delete"])?
                .json(&json!({ "messages": chunk }));
            self.send(req).await?;
            debug!(channel_id, count = chunk.len(), "Bulk deleted cards");
        }
        Ok(())
    }

    async fn list_reacting_users(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &Emoji,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<PlatformUser>, PlatformError> {
        let name = emoji.api_name();
        let mut req = self
            .request(Method::GET, &["channels", channel_id, "messages", message_id, "reactions", name.as_str()])?
            .query(&[("limit", limit.to_string())]);
        if let Some(after) = after {
            req = req.query(&[("after", after)]);
        }
        Self::decode(self.send(req).await?).await
    }

    async fn fetch_message(&self, channel_id: &str, message_id: &str) -> Result<PlatformMessage, PlatformError> {
        self.get(&["channels", channel_id, "messages", message_id]).await
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<PlatformChannel, PlatformError> {
        self.get(&["channels", channel_id]).await
    }

    async fn fetch_guild_channels(&self, guild_id: &str) -> Result<Vec<PlatformChannel>, PlatformError> {
        self.get(&["guilds", guild_id, "channels"]).await
    }

    async fn fetch_member(&self, guild_id: &str, user_id: &str) -> Result<GuildMember, PlatformError> {
        self.get(&["guilds", guild_id, "members", user_id]).await
    }

    async fn has_permission(&self, channel_id: &str, permission: Permission) -> Result<bool, PlatformError> {
        let bits = self.channel_permissions(channel_id).await?;
        Ok(bits & permission.bits() != 0)
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &Emoji) -> Result<(), PlatformError> {
        let name = emoji.api_name();
        let req = self.request(
            Method::PUT,
            &["channels", channel_id, "messages", message_id, "reactions", name.as_str(), "@me"],
        )?;
        self.send(req).await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &Emoji,
        user_id: &str,
    ) -> Result<(), PlatformError> {
        let name = emoji.api_name();
        let req = self.request(
            Method::DELETE,
            &["channels", channel_id, "messages", message_id, "reactions", name.as_str(), user_id],
        )?;
        self.send(req).await?;
        Ok(())
    }

    async fn send_text(&self, channel_id: &str, content: &str) -> Result<String, PlatformError> {
        self.post_message(channel_id, json!({ "content": content })).await
    }
}
