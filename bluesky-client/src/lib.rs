pub mod api;
pub mod cache;


pub use cache::{render_interactions, InteractionCache, CACHE_TTL};

use api::{
    CreateRecordRequest, CreateRecordResponse, CreateSessionRequest, CreateSessionResponse,
    ExternalEmbed, PostRecord, PostThreadResponse, XrpcErrorBody, CREATE_RECORD, CREATE_SESSION,
    GET_POST_THREAD, POST_COLLECTION,
};
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error, info};
use weather_core::{
    ActivityLog, Clock, CoreError, HttpResponse, HttpTransport, Interaction, PostReference,
    RemoteApiError, Session,
};

/// Client for the handful of XRPC calls the poster needs.
///
/// No session is cached: the convenience operations authenticate afresh
/// before every call.
pub struct SessionClient<T> {
    transport: T,
    api_base: String,
    clock: Arc<dyn Clock>,
    log: Arc<ActivityLog>,
}

impl<T: HttpTransport> SessionClient<T> {
    pub fn new(
        transport: T,
        api_base: impl Into<String>,
        clock: Arc<dyn Clock>,
        log: Arc<ActivityLog>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            transport,
            api_base,
            clock,
            log,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    /// `error` field of the body, or a generic message naming the status.
    fn failure_reason(response: &HttpResponse) -> String {
        serde_json::from_str::<XrpcErrorBody>(&response.body)
            .ok()
            .and_then(|body| body.error)
            .unwrap_or_else(|| format!("HTTP {} - Unknown error", response.status))
    }

    fn decode<R: DeserializeOwned>(method: &str, response: &HttpResponse) -> Result<R, CoreError> {
        serde_json::from_str(&response.body).map_err(|e| {
            error!("Failed to parse {} response: {}", method, e);
            RemoteApiError::InvalidResponse {
                method: method.to_string(),
                details: e.to_string(),
            }
            .into()
        })
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Session, CoreError> {
        self.log.debug("Creating Bluesky session");
        let body = serde_json::to_value(CreateSessionRequest {
            identifier: username,
            password,
        })?;

        let response = match self
            .transport
            .post_json(&self.endpoint(CREATE_SESSION), &body, None)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.log.debug(format!("Session creation failed: {}", e));
                return Err(e);
            }
        };

        if !response.is_ok() {
            let reason = Self::failure_reason(&response);
            self.log
                .debug(format!("Session creation failed: {}", reason));
            return Err(RemoteApiError::AuthenticationFailed { reason }.into());
        }

        let session: CreateSessionResponse = Self::decode(CREATE_SESSION, &response)?;
        self.log.debug("Session created successfully");
        debug!(
            "Authenticated as {}",
            session.handle.as_deref().unwrap_or(&session.did)
        );
        Ok(Session {
            access_jwt: session.access_jwt,
            did: session.did,
        })
    }

    fn check_response(
        &self,
        method: &str,
        response: Result<HttpResponse, CoreError>,
    ) -> Result<HttpResponse, CoreError> {
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.log.debug(format!("API request failed: {}", e));
                return Err(e);
            }
        };

        if !response.is_ok() {
            let reason = Self::failure_reason(&response);
            self.log.debug(format!("API request failed: {}", reason));
            return Err(RemoteApiError::RequestFailed {
                method: method.to_string(),
                status_code: response.status,
                reason,
            }
            .into());
        }

        self.log.debug("API request successful");
        Ok(response)
    }

    pub fn build_post(&self, text: &str, link_url: Option<&str>) -> PostRecord {
        PostRecord {
            record_type: POST_COLLECTION.to_string(),
            text: text.to_string(),
            created_at: self
                .clock
                .now()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            embed: link_url
                .filter(|link| !link.is_empty())
                .map(ExternalEmbed::link_card),
        }
    }

    pub async fn publish(
        &self,
        session: &Session,
        text: &str,
        link_url: Option<&str>,
    ) -> Result<PostReference, CoreError> {
        self.log.debug("Attempting to post content");
        let record = self.build_post(text, link_url);
        let body = serde_json::to_value(CreateRecordRequest {
            repo: &session.did,
            collection: POST_COLLECTION,
            record: &record,
        })?;
        self.log
            .debug(format!("API request to {} with data: {}", CREATE_RECORD, body));

        let sent = self
            .transport
            .post_json(&self.endpoint(CREATE_RECORD), &body, Some(&session.access_jwt))
            .await;
        let response = self.check_response(CREATE_RECORD, sent)?;
        let created: CreateRecordResponse = Self::decode(CREATE_RECORD, &response)?;

        self.log
            .debug(format!("Post API response: {}", response.body));
        info!("Published post {}", created.uri);
        Ok(PostReference {
            uri: created.uri,
            cid: created.cid,
        })
    }

    /// Direct replies to `post_uri`, in the order the API returns them,
    /// truncated to `limit`.
    pub async fn fetch_interactions(
        &self,
        session: &Session,
        post_uri: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>, CoreError> {
        self.log
            .debug(format!("Fetching interactions for post: {}", post_uri));
        let query = [("uri", post_uri.to_string()), ("depth", "1".to_string())];

        let sent = self
            .transport
            .get(
                &self.endpoint(GET_POST_THREAD),
                &query,
                Some(&session.access_jwt),
            )
            .await;
        let response = self.check_response(GET_POST_THREAD, sent)?;
        let thread: PostThreadResponse = Self::decode(GET_POST_THREAD, &response)?;

        let interactions: Vec<Interaction> = thread
            .thread
            .replies
            .unwrap_or_default()
            .into_iter()
            .filter_map(|reply| reply.post)
            .map(Interaction::from)
            .take(limit)
            .collect();

        self.log
            .debug(format!("Interactions fetched: {}", interactions.len()));
        Ok(interactions)
    }

    /// Fresh session, then one `createRecord`.
    pub async fn post_content(
        &self,
        username: &str,
        password: &str,
        text: &str,
        link_url: Option<&str>,
    ) -> Result<PostReference, CoreError> {
        let session = self.authenticate(username, password).await?;
        self.publish(&session, text, link_url).await
    }

    /// Fresh session, then one `getPostThread`.
    pub async fn post_interactions(
        &self,
        username: &str,
        password: &str,
        post_uri: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>, CoreError> {
        let session = self.authenticate(username, password).await?;
        self.fetch_interactions(&session, post_uri, limit).await
    }
}
