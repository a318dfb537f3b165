use bluesky_client::SessionClient;
use std::sync::Arc;
use tracing::info;
use weather_core::{
    ActivityLog, Clock, ConfigError, CoreError, ErrorReporter, HttpTransport, PosterConfig,
    PostReference, PublishOutcome, StateStore, DEFAULT_LOCATION,
};
use weather_feed::{compose, TelemetryParser};

/// Fetch, compose, publish, record.
///
/// Every failure is caught here, written to the debug log and turned into a
/// failed [`PublishOutcome`]; nothing escapes to the caller as an error.
pub struct PublishPipeline<T, S> {
    parser: TelemetryParser<T>,
    client: Arc<SessionClient<T>>,
    store: S,
    log: Arc<ActivityLog>,
    clock: Arc<dyn Clock>,
    reporter: ErrorReporter,
}

impl<T: HttpTransport, S: StateStore> PublishPipeline<T, S> {
    pub fn new(
        parser: TelemetryParser<T>,
        client: Arc<SessionClient<T>>,
        store: S,
        log: Arc<ActivityLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            parser,
            client,
            store,
            log,
            clock,
            reporter: ErrorReporter::default(),
        }
    }

    /// Replaces how failures are traced; the debug log is written regardless.
    pub fn with_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub async fn run(&self, config: &PosterConfig) -> PublishOutcome {
        let result = self.publish_weather_update(config).await;
        let now = self.clock.now();

        let outcome = match result {
            Ok((text, reference)) => {
                self.log.debug(format!(
                    "Post successful:\nWeather: {}\nResponse: {}",
                    text, reference.uri
                ));
                info!("Weather update posted as {}", reference.uri);
                PublishOutcome::succeeded(text, reference.uri, now)
            }
            Err(e) => {
                self.reporter.report_error(&e);
                self.log.debug(format!("Post failed: {}", e));
                PublishOutcome::failed(&e, now)
            }
        };

        self.log.flush_to(&self.store).await;
        outcome
    }

    async fn publish_weather_update(
        &self,
        config: &PosterConfig,
    ) -> Result<(String, PostReference), CoreError> {
        if config.telemetry_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "telemetry_url".to_string(),
            }
            .into());
        }
        let (username, password) = config.credentials()?;

        self.log.debug("Starting weather update post");
        let snapshot = self.parser.fetch(&config.telemetry_url).await?;

        let location = match config.location.trim() {
            "" => DEFAULT_LOCATION,
            location => location,
        };
        let text = compose(&snapshot, location, &config.website_url);
        let link = Some(config.live_weather_url.as_str()).filter(|url| !url.is_empty());

        let reference = self
            .client
            .post_content(username, password, &text, link)
            .await?;

        // The post is live at this point; losing the reference only affects the feed.
        if let Err(e) = self.store.set_last_post_uri(&reference.uri).await {
            self.reporter.report_warning(&e);
            self.log
                .debug(format!("Failed to store last post reference: {}", e));
        }

        Ok((text, reference))
    }
}
