use bluesky_client::InteractionCache;
use weather_core::{clamp_feed_limit, ErrorExt, HttpTransport, PosterConfig, StateStore};

/// Read path for the interaction list under the most recent post.
pub struct FeedService<T, S> {
    cache: InteractionCache<T>,
    store: S,
}

impl<T: HttpTransport, S: StateStore> FeedService<T, S> {
    pub fn new(cache: InteractionCache<T>, store: S) -> Self {
        Self { cache, store }
    }

    /// Renders replies to the last published post. `limit` overrides the
    /// configured feed limit and is clamped the same way.
    pub async fn render(&self, config: &PosterConfig, limit: Option<i64>) -> String {
        let post_uri = match self.store.last_post_uri().await {
            Ok(uri) => uri,
            Err(e) => {
                e.log_warn();
                None
            }
        };
        let limit = limit
            .map(clamp_feed_limit)
            .unwrap_or_else(|| config.feed_limit());

        self.cache
            .get(config.credentials().ok(), post_uri.as_deref(), limit)
            .await
    }
}
