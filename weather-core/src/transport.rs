//! The HTTP seam shared by the feed reader and the Bluesky client.

use crate::error::{CoreError, TransportError};
use crate::REQUEST_TIMEOUT;
use reqwest::Client;
use std::future::Future;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

pub trait HttpTransport: Send + Sync {
    /// GET with optional query parameters and bearer token.
    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse, CoreError>> + Send;

    /// POST a JSON body with optional bearer token.
    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        bearer: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse, CoreError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, CoreError> {
        Self::build(user_agent, true)
    }

    /// Skips certificate checks. Only for the station feed, which is often
    /// served from a self-signed host.
    pub fn without_tls_verification(user_agent: &str) -> Result<Self, CoreError> {
        Self::build(user_agent, false)
    }

    fn build(user_agent: &str, verify_tls: bool) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| TransportError::Connection {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { http_client })
    }

    async fn read(response: reqwest::Response) -> Result<HttpResponse, CoreError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> Result<HttpResponse, CoreError> {
        let mut request = self.http_client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        debug!("GET {}", url);
        let response = request.send().await?;
        Self::read(response).await
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, CoreError> {
        // .json() sets Content-Type: application/json
        let mut request = self.http_client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        debug!("POST {}", url);
        let response = request.send().await?;
        Self::read(response).await
    }
}

impl<T: HttpTransport> HttpTransport for std::sync::Arc<T> {
    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse, CoreError>> + Send {
        (**self).get(url, query, bearer)
    }

    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        bearer: Option<&str>,
    ) -> impl Future<Output = Result<HttpResponse, CoreError>> + Send {
        (**self).post_json(url, body, bearer)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    //! A transport that answers from a script and remembers every request.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub method: &'static str,
        pub url: String,
        pub query: Vec<(String, String)>,
        pub body: Option<serde_json::Value>,
        pub bearer: Option<String>,
    }

    type Scripted = Result<HttpResponse, TransportError>;

    /// Responses are matched by URL suffix. Each endpoint replays its queue
    /// in order and keeps repeating the last entry once the queue is drained.
    #[derive(Debug, Default)]
    pub struct ScriptedTransport {
        routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, endpoint: &str, status: u16, body: impl Into<String>) -> &Self {
            self.push(
                endpoint,
                Ok(HttpResponse {
                    status,
                    body: body.into(),
                }),
            )
        }

        pub fn fail(&self, endpoint: &str, error: TransportError) -> &Self {
            self.push(endpoint, Err(error))
        }

        fn push(&self, endpoint: &str, scripted: Scripted) -> &Self {
            self.routes
                .lock()
                .unwrap()
                .entry(endpoint.to_string())
                .or_default()
                .push_back(scripted);
            self
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn calls_to(&self, endpoint: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.url.ends_with(endpoint))
                .count()
        }

        pub fn total_calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn answer(&self, request: RecordedRequest) -> Result<HttpResponse, CoreError> {
            let url = request.url.clone();
            self.requests.lock().unwrap().push(request);

            let mut routes = self.routes.lock().unwrap();
            let queue = routes
                .iter_mut()
                .find(|(endpoint, _)| url.ends_with(endpoint.as_str()))
                .map(|(_, queue)| queue);

            let scripted = match queue {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };

            match scripted {
                Some(Ok(response)) => Ok(response),
                Some(Err(error)) => Err(error.into()),
                None => Err(TransportError::Connection {
                    reason: format!("no scripted response for {}", url),
                }
                .into()),
            }
        }
    }

    impl HttpTransport for ScriptedTransport {
        async fn get(
            &self,
            url: &str,
            query: &[(&str, String)],
            bearer: Option<&str>,
        ) -> Result<HttpResponse, CoreError> {
            self.answer(RecordedRequest {
                method: "GET",
                url: url.to_string(),
                query: query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                body: None,
                bearer: bearer.map(str::to_string),
            })
        }

        async fn post_json(
            &self,
            url: &str,
            body: &serde_json::Value,
            bearer: Option<&str>,
        ) -> Result<HttpResponse, CoreError> {
            self.answer(RecordedRequest {
                method: "POST",
                url: url.to_string(),
                query: Vec::new(),
                body: Some(body.clone()),
                bearer: bearer.map(str::to_string),
            })
        }
    }
}
