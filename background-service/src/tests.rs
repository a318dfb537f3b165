use crate::{BackgroundService, FeedService, PublishPipeline, Scheduler};
use bluesky_client::{InteractionCache, SessionClient};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::oneshot;
use weather_core::transport::testing::ScriptedTransport;
use weather_core::{
    ActivityLog, ManualClock, MemoryStore, PosterConfig, StateStore, UploadStatus,
};
use weather_feed::TelemetryParser;

const FEED_URL: &str = "https://station.example/clientraw.txt";
const POST_URI: &str = "at://did:plc:station/app.bsky.feed.post/3kabc";
const REFERENCE_FEED: &str = "12345 12 0 270 15.5 63 0 0 0 0 0";

type Transport = Arc<ScriptedTransport>;
type Store = Arc<MemoryStore>;

struct Fixture {
    transport: Transport,
    store: Store,
    clock: ManualClock,
    log: Arc<ActivityLog>,
    client: Arc<SessionClient<Transport>>,
}

impl Fixture {
    fn new() -> Self {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let log = Arc::new(ActivityLog::new(Arc::new(clock.clone())));
        let client = Arc::new(SessionClient::new(
            transport.clone(),
            "https://bsky.test/xrpc",
            Arc::new(clock.clone()),
            log.clone(),
        ));
        Self {
            transport,
            store: Arc::new(MemoryStore::new()),
            clock,
            log,
            client,
        }
    }

    fn pipeline(&self) -> PublishPipeline<Transport, Store> {
        PublishPipeline::new(
            TelemetryParser::new(self.transport.clone(), self.log.clone()),
            self.client.clone(),
            self.store.clone(),
            self.log.clone(),
            Arc::new(self.clock.clone()),
        )
    }

    fn feed(&self) -> FeedService<Transport, Store> {
        FeedService::new(
            InteractionCache::new(
                self.client.clone(),
                Arc::new(self.clock.clone()),
                self.log.clone(),
            ),
            self.store.clone(),
        )
    }

    fn script_happy_path(&self) {
        self.transport.respond("clientraw.txt", 200, REFERENCE_FEED);
        self.transport.respond(
            "com.atproto.server.createSession",
            200,
            json!({"accessJwt": "jwt-123", "did": "did:plc:station"}).to_string(),
        );
        self.transport.respond(
            "com.atproto.repo.createRecord",
            200,
            json!({"uri": POST_URI, "cid": "bafyrei"}).to_string(),
        );
    }

    fn debug_messages(&self) -> Vec<String> {
        self.log
            .debug_entries()
            .into_iter()
            .map(|e| e.message)
            .collect()
    }
}

fn config() -> PosterConfig {
    PosterConfig {
        username: "station.bsky.social".to_string(),
        password: "app-pass".to_string(),
        telemetry_url: FEED_URL.to_string(),
        live_weather_url: "https://wx.example/live".to_string(),
        location: "Dunfermline".to_string(),
        website_url: "https://wx.example".to_string(),
        ..PosterConfig::default()
    }
}

#[tokio::test]
async fn test_publish_end_to_end() {
    let fixture = Fixture::new();
    fixture.script_happy_path();

    let outcome = fixture.pipeline().run(&config()).await;

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.hint, None);
    assert_eq!(outcome.post_uri.as_deref(), Some(POST_URI));
    let text = outcome.post_text.unwrap();
    assert!(text.starts_with("📍 Dunfermline\n\n"));
    assert!(text.contains("Temperature: 15.5°C"));
    assert!(text.contains("Humidity: 63%"));
    assert!(text.contains("Wind: 12 km/h W"));
    assert!(text.ends_with("\n\n🌐 https://wx.example"));

    let published = fixture
        .transport
        .requests()
        .into_iter()
        .find(|r| r.url.ends_with("com.atproto.repo.createRecord"))
        .unwrap();
    let record = &published.body.unwrap()["record"];
    assert_eq!(record["text"], text.as_str());
    assert_eq!(record["embed"]["external"]["uri"], "https://wx.example/live");

    assert_eq!(
        fixture.store.last_post_uri().await.unwrap().as_deref(),
        Some(POST_URI)
    );
    assert!(fixture
        .debug_messages()
        .iter()
        .any(|m| m.starts_with("Post successful:")));
    assert_eq!(fixture.log.upload_entries()[0].status, Some(UploadStatus::Success));

    // logs were flushed to the store after the run
    let persisted = fixture
        .store
        .load_log(weather_core::LogKind::Debug)
        .await
        .unwrap();
    assert_eq!(persisted, fixture.log.debug_entries());
}

#[tokio::test]
async fn test_empty_credentials_never_authenticate() {
    let fixture = Fixture::new();
    fixture.script_happy_path();
    let config = PosterConfig {
        password: String::new(),
        ..config()
    };

    let outcome = fixture.pipeline().run(&config).await;

    assert!(!outcome.success);
    assert_eq!(outcome.message, "Configuration error: Credentials not configured");
    assert_eq!(
        outcome.hint.as_deref(),
        Some("Bluesky username or password not configured.")
    );
    assert_eq!(outcome.error_code.as_deref(), Some("CONFIG"));
    assert_eq!(fixture.transport.total_calls(), 0);
    assert!(fixture.log.upload_entries().is_empty());
    let messages = fixture.debug_messages();
    assert!(messages
        .iter()
        .any(|m| m == "Post failed: Configuration error: Credentials not configured"));
    assert!(!messages.iter().any(|m| m.starts_with("Post successful")));
    assert_eq!(fixture.store.last_post_uri().await.unwrap(), None);
}

#[tokio::test]
async fn test_missing_feed_url_fails_before_network() {
    let fixture = Fixture::new();
    let config = PosterConfig {
        telemetry_url: "  ".to_string(),
        ..config()
    };

    let outcome = fixture.pipeline().run(&config).await;
    assert!(!outcome.success);
    assert!(outcome.message.contains("telemetry_url"));
    assert_eq!(fixture.transport.total_calls(), 0);
}

#[tokio::test]
async fn test_bad_feed_stops_before_publishing() {
    let fixture = Fixture::new();
    fixture.transport.respond("clientraw.txt", 200, "12 0 0");

    let outcome = fixture.pipeline().run(&config()).await;
    assert!(!outcome.success);
    assert_eq!(fixture.transport.calls_to("clientraw.txt"), 1);
    assert_eq!(fixture.transport.calls_to("com.atproto.server.createSession"), 0);

    let uploads = fixture.log.upload_entries();
    assert_eq!(uploads[0].status, Some(UploadStatus::Failed));
    assert_eq!(uploads[0].message, "No data");
    assert!(fixture
        .debug_messages()
        .iter()
        .any(|m| m.starts_with("Post failed: Format error")));
}

#[tokio::test]
async fn test_rejected_post_is_reported_not_stored() {
    let fixture = Fixture::new();
    fixture.transport.respond("clientraw.txt", 200, REFERENCE_FEED);
    fixture.transport.respond(
        "com.atproto.server.createSession",
        401,
        json!({"error": "AuthenticationRequired"}).to_string(),
    );

    let outcome = fixture.pipeline().run(&config()).await;
    assert!(!outcome.success);
    assert_eq!(
        outcome.message,
        "Remote API error: Session creation failed: AuthenticationRequired"
    );
    assert_eq!(fixture.transport.calls_to("com.atproto.repo.createRecord"), 0);
    assert_eq!(fixture.store.last_post_uri().await.unwrap(), None);
}

#[tokio::test]
async fn test_blank_location_uses_default() {
    let fixture = Fixture::new();
    fixture.script_happy_path();
    let config = PosterConfig {
        location: String::new(),
        website_url: String::new(),
        ..config()
    };

    let outcome = fixture.pipeline().run(&config).await;
    let text = outcome.post_text.unwrap();
    assert!(text.starts_with("📍 Unknown Location\n\n"));
    assert!(!text.contains("🌐"));
}

#[tokio::test]
async fn test_feed_reads_last_post_from_store() {
    let fixture = Fixture::new();
    let feed = fixture.feed();

    assert_eq!(
        feed.render(&config(), None).await,
        bluesky_client::cache::UNAVAILABLE_PAYLOAD
    );
    assert_eq!(fixture.transport.total_calls(), 0);

    fixture.store.set_last_post_uri(POST_URI).await.unwrap();
    fixture.transport.respond(
        "com.atproto.server.createSession",
        200,
        json!({"accessJwt": "jwt-123", "did": "did:plc:station"}).to_string(),
    );
    fixture.transport.respond(
        "app.bsky.feed.getPostThread",
        200,
        json!({"thread": {"replies": [
            {"post": {"author": {"handle": "a.bsky.social"}, "record": {"text": "one", "createdAt": "t1"}}},
            {"post": {"author": {"handle": "b.bsky.social"}, "record": {"text": "two", "createdAt": "t2"}}}
        ]}})
        .to_string(),
    );

    let rendered = feed.render(&config(), Some(1)).await;
    assert_eq!(rendered, "a.bsky.social: one\nPosted: t1");

    let request = fixture
        .transport
        .requests()
        .into_iter()
        .find(|r| r.url.ends_with("app.bsky.feed.getPostThread"))
        .unwrap();
    assert!(request
        .query
        .contains(&("uri".to_string(), POST_URI.to_string())));
}

#[tokio::test]
async fn test_service_manual_run_and_shutdown() {
    let fixture = Fixture::new();
    fixture.script_happy_path();
    let scheduler = Scheduler::with_timezone(
        Arc::new(fixture.clock.clone()),
        fixture.log.clone(),
        Utc,
    );
    let config = PosterConfig {
        post_times: "18:00".to_string(),
        ..config()
    };
    let (service, handle) = BackgroundService::new(fixture.pipeline(), scheduler, config);
    let (stop, stopped) = oneshot::channel::<()>();

    let client = async {
        let outcome = handle.run_now().await.unwrap();
        assert!(outcome.success);

        handle.reconfigure(PosterConfig {
            post_times: String::new(),
            post_interval_minutes: 45,
            ..self::config()
        });
        let _ = stop.send(());
    };
    let shutdown = async {
        let _ = stopped.await;
    };

    let (result, ()) = tokio::join!(service.run(shutdown), client);
    result.unwrap();

    assert_eq!(fixture.transport.calls_to("com.atproto.repo.createRecord"), 1);
    let messages = fixture.debug_messages();
    assert!(messages
        .iter()
        .any(|m| m.starts_with("Scheduled post at 18:00 daily")));
    assert_eq!(
        messages.last().map(String::as_str),
        Some("Scheduler stopped, triggers cleared")
    );

    // the service is gone, so the handle reports it
    let error = handle.run_now().await.unwrap_err();
    assert!(matches!(
        error,
        weather_core::CoreError::Scheduling(weather_core::SchedulingError::ServiceStopped)
    ));
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_service_fires_due_trigger_once_then_reschedules() {
    let fixture = Fixture::new();
    fixture.script_happy_path();
    let scheduler = Scheduler::with_timezone(
        Arc::new(fixture.clock.clone()),
        fixture.log.clone(),
        Utc,
    );
    // the fixture clock reads exactly 10:00, so today's post is due right away
    let config = PosterConfig {
        post_times: "10:00".to_string(),
        ..config()
    };
    let (service, handle) = BackgroundService::new(fixture.pipeline(), scheduler, config);
    let (stop, stopped) = oneshot::channel::<()>();

    let client = async {
        wait_until(|| fixture.transport.calls_to("com.atproto.repo.createRecord") == 1).await;

        handle.reconfigure(PosterConfig {
            post_times: String::new(),
            post_interval_minutes: 45,
            ..self::config()
        });
        wait_until(|| {
            fixture
                .debug_messages()
                .iter()
                .any(|m| m.starts_with("Scheduled posts every 45 minutes"))
        })
        .await;
        let _ = stop.send(());
    };
    let shutdown = async {
        let _ = stopped.await;
    };

    let (result, ()) = tokio::join!(service.run(shutdown), client);
    result.unwrap();

    // the daily trigger moved to tomorrow after firing, so it ran exactly once
    assert_eq!(fixture.transport.calls_to("com.atproto.repo.createRecord"), 1);

    let messages = fixture.debug_messages();
    let position = |prefix: &str| {
        messages
            .iter()
            .position(|m| m.starts_with(prefix))
            .unwrap_or_else(|| panic!("missing debug line starting with {:?}", prefix))
    };
    let daily = position("Scheduled post at 10:00 daily, next run: 2024-05-01 10:00:00");
    let posted = position("Post successful:");
    let rescheduled = position("Rescheduling with post_times: '', interval: 45");
    let interval = position("Scheduled posts every 45 minutes, next run: 2024-05-01 10:01:00");
    assert!(daily < posted);
    assert!(posted < rescheduled);
    assert!(rescheduled < interval);
    assert!(!messages[rescheduled..]
        .iter()
        .any(|m| m.starts_with("Scheduled post at")));
}
