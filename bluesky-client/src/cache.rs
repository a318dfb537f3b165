//! Short-lived cache of rendered reply lists for the latest post.

use crate::SessionClient;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use weather_core::{clamp_feed_limit, ActivityLog, Clock, HttpTransport, Interaction};

pub const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

pub const UNAVAILABLE_PAYLOAD: &str =
    "No Bluesky interactions available. Ensure a post has been made and credentials are set.";
pub const NO_INTERACTIONS_PAYLOAD: &str = "No interactions found for the latest post.";

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    expires_at: DateTime<Utc>,
}

pub fn cache_key(post_uri: &str, limit: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(post_uri.as_bytes());
    hasher.update([0u8]);
    hasher.update(limit.to_string().as_bytes());
    format!("bluesky_feed_{}", hex::encode(hasher.finalize()))
}

/// Plain-text rendering, one block per reply. Zero counts are omitted.
pub fn render_interactions(interactions: &[Interaction]) -> String {
    interactions
        .iter()
        .map(|interaction| {
            let mut block = format!(
                "{}: {}\nPosted: {}",
                interaction.author, interaction.text, interaction.created_at
            );
            if interaction.like_count > 0 {
                block.push_str(&format!(" | Likes: {}", interaction.like_count));
            }
            if interaction.repost_count > 0 {
                block.push_str(&format!(" | Reposts: {}", interaction.repost_count));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct InteractionCache<T> {
    client: Arc<SessionClient<T>>,
    clock: Arc<dyn Clock>,
    log: Arc<ActivityLog>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: chrono::Duration,
}

impl<T: HttpTransport> InteractionCache<T> {
    pub fn new(client: Arc<SessionClient<T>>, clock: Arc<dyn Clock>, log: Arc<ActivityLog>) -> Self {
        Self {
            client,
            clock,
            log,
            entries: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::seconds(CACHE_TTL.as_secs() as i64),
        }
    }

    fn lookup(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.payload.clone())
    }

    fn insert(&self, key: String, payload: String, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| now < entry.expires_at);
        entries.insert(
            key,
            CacheEntry {
                payload,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rendered replies for `post_uri`. Without a post or credentials this
    /// returns [`UNAVAILABLE_PAYLOAD`] and touches nothing on the network.
    /// Only non-empty successful fetches are cached.
    pub async fn get(
        &self,
        credentials: Option<(&str, &str)>,
        post_uri: Option<&str>,
        limit: usize,
    ) -> String {
        let limit = clamp_feed_limit(limit as i64);
        let credentials = credentials.filter(|(user, pass)| !user.is_empty() && !pass.is_empty());
        let post_uri = post_uri.filter(|uri| !uri.is_empty());
        let (Some((username, password)), Some(post_uri)) = (credentials, post_uri) else {
            return UNAVAILABLE_PAYLOAD.to_string();
        };

        let key = cache_key(post_uri, limit);
        if let Some(payload) = self.lookup(&key, self.clock.now()) {
            debug!("Interaction cache hit for {}", post_uri);
            return payload;
        }

        match self
            .client
            .post_interactions(username, password, post_uri, limit)
            .await
        {
            Ok(interactions) if interactions.is_empty() => NO_INTERACTIONS_PAYLOAD.to_string(),
            Ok(interactions) => {
                let payload = render_interactions(&interactions);
                self.insert(key, payload.clone(), self.clock.now());
                payload
            }
            Err(e) => {
                self.log.debug(format!("Feed render failed: {}", e));
                format!("Error loading Bluesky interactions: {}", e)
            }
        }
    }
}
