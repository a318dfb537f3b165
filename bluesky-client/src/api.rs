use serde::{Deserialize, Serialize};
use weather_core::Interaction;

pub const CREATE_SESSION: &str = "com.atproto.server.createSession";
pub const CREATE_RECORD: &str = "com.atproto.repo.createRecord";
pub const GET_POST_THREAD: &str = "app.bsky.feed.getPostThread";

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
pub const EXTERNAL_EMBED_TYPE: &str = "app.bsky.embed.external";
pub const LINK_CARD_TITLE: &str = "Live Weather Data";
pub const LINK_CARD_DESCRIPTION: &str = "Latest weather updates from MM0ZIF_WX";

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub access_jwt: String,
    pub did: String,
    #[serde(default)]
    pub handle: Option<String>,
}

/// Error body every XRPC endpoint returns on failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct XrpcErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub text: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<ExternalEmbed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEmbed {
    #[serde(rename = "$type")]
    pub embed_type: String,
    pub external: ExternalLink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalLink {
    pub uri: String,
    pub title: String,
    pub description: String,
}

impl ExternalEmbed {
    pub fn link_card(uri: &str) -> Self {
        Self {
            embed_type: EXTERNAL_EMBED_TYPE.to_string(),
            external: ExternalLink {
                uri: uri.to_string(),
                title: LINK_CARD_TITLE.to_string(),
                description: LINK_CARD_DESCRIPTION.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRecordRequest<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub record: &'a PostRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecordResponse {
    pub uri: String,
    #[serde(default)]
    pub cid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostThreadResponse {
    pub thread: ThreadView,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadView {
    #[serde(default)]
    pub replies: Option<Vec<ThreadReply>>,
}

/// A reply slot in the thread. Blocked or deleted replies come back without
/// a `post`.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadReply {
    #[serde(default)]
    pub post: Option<PostView>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub author: AuthorView,
    #[serde(default)]
    pub record: ReplyRecord,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub repost_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorView {
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: String,
}

impl From<PostView> for Interaction {
    fn from(post: PostView) -> Self {
        let author = match post.author.display_name {
            Some(name) if !name.is_empty() => name,
            _ => post.author.handle,
        };
        Self {
            author,
            text: post.record.text,
            created_at: post.record.created_at,
            like_count: post.like_count.unwrap_or(0),
            repost_count: post.repost_count.unwrap_or(0),
        }
    }
}
