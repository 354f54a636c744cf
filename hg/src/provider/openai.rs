//! Assistants API client implementation
//!
//! Implements the AssistantProvider trait over OpenAI's Assistants (v2)
//! HTTP API: threads, messages, runs and assistants.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use super::{AssistantProvider, IdentitySpec, ProviderError, Resource, RunRequest, RunStatus};
use crate::config::ProviderConfig;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Work out which resource a 404 refers to
///
/// Run creation 404s when either the thread or the assistant is unknown; the
/// error body names the missing object.
fn not_found_resource(default: Resource, body: &str) -> Resource {
    let body = body.to_lowercase();
    if body.contains("no assistant") {
        Resource::Identity
    } else if body.contains("no thread") {
        Resource::Thread
    } else {
        default
    }
}

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    role: String,
    content: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagePart {
    Text {
        text: TextValue,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct AssistantObject {
    #[serde(default)]
    instructions: Option<String>,
}

/// Assistants API client
pub struct AssistantsClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    timeout: Duration,
    max_retries: u32,
}

impl AssistantsClient {
    /// Create a new client from configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        debug!(base_url = %config.base_url, model = %config.model, "from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let mut client = Self::new(&config.base_url, api_key, &config.model, Duration::from_millis(config.timeout_ms))?;
        client.max_retries = config.max_retries;
        Ok(client)
    }

    /// Create a client with explicit settings and no HTTP-level retries
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(timeout).build().map_err(ProviderError::Network)?;

        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            timeout,
            max_retries: 0,
        })
    }

    /// Send one API request, retrying transient failures up to `max_retries`
    ///
    /// Rate limits wait for the provider's `retry-after`; other transient
    /// errors back off exponentially.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        resource: Resource,
        resource_id: &str,
    ) -> Result<T, ProviderError> {
        debug!(%method, %path, "send: called");
        let mut attempt = 0;
        loop {
            match self.send_once(&method, path, body, resource, resource_id).await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = err
                        .retry_after()
                        .unwrap_or_else(|| Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1)));
                    if err.is_rate_limit() {
                        warn!(attempt, ?backoff, %path, "send: rate limited, waiting");
                    } else {
                        warn!(attempt, ?backoff, %path, error = %err, "send: retrying after transient error");
                    }
                    tokio::time::sleep(backoff).await;
                }
                other => return other,
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        resource: Resource,
        resource_id: &str,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2");
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            debug!(error = %e, "send_once: network error");
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout)
            } else {
                ProviderError::Network(e)
            }
        })?;

        let status = response.status().as_u16();

        if status == 404 {
            let text = response.text().await.unwrap_or_default();
            let resource = not_found_resource(resource, &text);
            debug!(%resource, %resource_id, "send_once: not found");
            return Err(ProviderError::NotFound {
                resource,
                id: resource_id.to_string(),
            });
        }

        if status == 429 {
            debug!("send_once: rate limited (429)");
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);

            return Err(ProviderError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !response.status().is_success() {
            debug!(%status, "send_once: API error");
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError { status, message: text });
        }

        let text = response.text().await?;
        debug!(response_len = text.len(), "send_once: success");
        Ok(serde_json::from_str(&text)?)
    }

    /// Build the run creation body
    fn build_run_body(&self, identity_id: &str, request: &RunRequest) -> Value {
        debug!(%identity_id, max_tokens = request.max_tokens, "build_run_body: called");
        let mut body = json!({ "assistant_id": identity_id });

        if request.max_tokens > 0 {
            body["max_completion_tokens"] = json!(request.max_tokens);
        }

        if let Some(constraint) = &request.schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": constraint.name,
                    "schema": constraint.schema,
                    "strict": constraint.strict,
                }
            });
        }

        if let Some(extra) = &request.additional_instructions {
            body["additional_instructions"] = json!(extra);
        }

        body
    }
}

#[async_trait]
impl AssistantProvider for AssistantsClient {
    async fn create_conversation(&self) -> Result<String, ProviderError> {
        debug!("create_conversation: called");
        let thread: IdObject = self
            .send(Method::POST, "/v1/threads", Some(&json!({})), Resource::Thread, "")
            .await?;
        Ok(thread.id)
    }

    async fn post_message(&self, thread_id: &str, text: &str) -> Result<(), ProviderError> {
        debug!(%thread_id, text_len = text.len(), "post_message: called");
        let body = json!({ "role": "user", "content": text });
        let _: Value = self
            .send(
                Method::POST,
                &format!("/v1/threads/{}/messages", thread_id),
                Some(&body),
                Resource::Thread,
                thread_id,
            )
            .await?;
        Ok(())
    }

    async fn trigger_run(
        &self,
        thread_id: &str,
        identity_id: &str,
        request: &RunRequest,
    ) -> Result<String, ProviderError> {
        debug!(%thread_id, %identity_id, "trigger_run: called");
        let body = self.build_run_body(identity_id, request);
        let run: IdObject = self
            .send(
                Method::POST,
                &format!("/v1/threads/{}/runs", thread_id),
                Some(&body),
                Resource::Thread,
                thread_id,
            )
            .await
            .map_err(|e| match e {
                ProviderError::NotFound {
                    resource: Resource::Identity,
                    ..
                } => ProviderError::NotFound {
                    resource: Resource::Identity,
                    id: identity_id.to_string(),
                },
                other => other,
            })?;
        Ok(run.id)
    }

    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatus, ProviderError> {
        debug!(%thread_id, %run_id, "get_run_status: called");
        let run: RunObject = self
            .send(
                Method::GET,
                &format!("/v1/threads/{}/runs/{}", thread_id, run_id),
                None,
                Resource::Run,
                run_id,
            )
            .await?;

        let reason = run
            .last_error
            .map(|e| match e.code {
                Some(code) => format!("{}: {}", code, e.message),
                None => e.message,
            })
            .or_else(|| run.incomplete_details.and_then(|d| d.reason));
        Ok(RunStatus::from_provider(&run.status, reason))
    }

    async fn get_latest_message(&self, thread_id: &str) -> Result<String, ProviderError> {
        debug!(%thread_id, "get_latest_message: called");
        let list: MessageList = self
            .send(
                Method::GET,
                &format!("/v1/threads/{}/messages?limit=1&order=desc", thread_id),
                None,
                Resource::Thread,
                thread_id,
            )
            .await?;

        let message = list
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("Thread has no messages".to_string()))?;

        if message.role != "assistant" {
            debug!(role = %message.role, "get_latest_message: latest message is not from the assistant");
            return Err(ProviderError::InvalidResponse(format!(
                "Latest message has role '{}', expected assistant",
                message.role
            )));
        }

        let text: String = message
            .content
            .into_iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.value),
                MessagePart::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(ProviderError::InvalidResponse("Latest message has no text content".to_string()));
        }
        Ok(text)
    }

    async fn create_identity(&self, spec: &IdentitySpec) -> Result<String, ProviderError> {
        debug!(name = %spec.name, "create_identity: called");
        let body = json!({
            "model": self.model,
            "name": spec.name,
            "instructions": spec.instructions,
        });
        let assistant: IdObject = self
            .send(Method::POST, "/v1/assistants", Some(&body), Resource::Identity, "")
            .await?;
        Ok(assistant.id)
    }

    async fn get_identity(&self, identity_id: &str) -> Result<Option<String>, ProviderError> {
        debug!(%identity_id, "get_identity: called");
        let result: Result<AssistantObject, ProviderError> = self
            .send(
                Method::GET,
                &format!("/v1/assistants/{}", identity_id),
                None,
                Resource::Identity,
                identity_id,
            )
            .await;
        match result {
            Ok(assistant) => Ok(Some(assistant.instructions.unwrap_or_default())),
            Err(e) if e.is_not_found(Resource::Identity) => {
                debug!(%identity_id, "get_identity: identity not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn update_identity(&self, identity_id: &str, instructions: &str) -> Result<(), ProviderError> {
        debug!(%identity_id, "update_identity: called");
        let body = json!({ "instructions": instructions });
        let _: Value = self
            .send(
                Method::POST,
                &format!("/v1/assistants/{}", identity_id),
                Some(&body),
                Resource::Identity,
                identity_id,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SchemaConstraint;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> AssistantsClient {
        AssistantsClient::new(server.url(), "test-key", "gpt-test", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_not_found_resource_classification() {
        assert_eq!(
            not_found_resource(Resource::Thread, r#"{"error":{"message":"No assistant found with id 'asst_x'."}}"#),
            Resource::Identity
        );
        assert_eq!(
            not_found_resource(Resource::Run, r#"{"error":{"message":"No thread found with id 'thread_x'."}}"#),
            Resource::Thread
        );
        assert_eq!(not_found_resource(Resource::Run, ""), Resource::Run);
    }

    #[test]
    fn test_build_run_body_includes_strict_schema() {
        let client = AssistantsClient::new("http://localhost", "k", "m", Duration::from_secs(1)).unwrap();
        let request = RunRequest {
            schema: Some(SchemaConstraint {
                name: "core".to_string(),
                schema: json!({"type": "object"}),
                strict: true,
            }),
            max_tokens: 1000,
            additional_instructions: None,
        };
        let body = client.build_run_body("asst_1", &request);
        assert_eq!(body["assistant_id"], "asst_1");
        assert_eq!(body["max_completion_tokens"], 1000);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert!(body.get("additional_instructions").is_none());
    }

    #[tokio::test]
    async fn test_create_conversation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/threads")
            .match_header("authorization", "Bearer test-key")
            .match_header("openai-beta", "assistants=v2")
            .with_status(200)
            .with_body(r#"{"id":"thread_abc","object":"thread"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.create_conversation().await.unwrap(), "thread_abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_message_to_missing_thread() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/threads/thread_gone/messages")
            .with_status(404)
            .with_body(r#"{"error":{"message":"No thread found with id 'thread_gone'."}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.post_message("thread_gone", "hello").await.unwrap_err();
        assert!(err.is_not_found(Resource::Thread));
    }

    #[tokio::test]
    async fn test_trigger_run_with_unknown_assistant() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/threads/thread_1/runs")
            .with_status(404)
            .with_body(r#"{"error":{"message":"No assistant found with id 'asst_old'."}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .trigger_run("thread_1", "asst_old", &RunRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { resource: Resource::Identity, ref id } if id == "asst_old"));
    }

    #[tokio::test]
    async fn test_trigger_run_sends_schema() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/threads/thread_1/runs")
            .match_body(Matcher::PartialJson(json!({
                "assistant_id": "asst_1",
                "response_format": {"type": "json_schema", "json_schema": {"name": "gtm", "strict": true}}
            })))
            .with_status(200)
            .with_body(r#"{"id":"run_1","status":"queued"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let request = RunRequest {
            schema: Some(SchemaConstraint {
                name: "gtm".to_string(),
                schema: json!({"type": "object"}),
                strict: true,
            }),
            max_tokens: 500,
            additional_instructions: None,
        };
        assert_eq!(client.trigger_run("thread_1", "asst_1", &request).await.unwrap(), "run_1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_run_status_maps_failure_reason() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/threads/thread_1/runs/run_1")
            .with_status(200)
            .with_body(r#"{"id":"run_1","status":"failed","last_error":{"code":"server_error","message":"boom"}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let status = client.get_run_status("thread_1", "run_1").await.unwrap();
        assert_eq!(status, RunStatus::Failed("server_error: boom".to_string()));
    }

    #[tokio::test]
    async fn test_get_latest_message_joins_text_parts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/threads/thread_1/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"data":[{"id":"msg_1","role":"assistant","content":[
                    {"type":"text","text":{"value":"{\"a\":1}","annotations":[]}},
                    {"type":"image_file","image_file":{"file_id":"f"}}
                ]}]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.get_latest_message("thread_1").await.unwrap(), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_get_identity_not_found_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/assistants/asst_missing")
            .with_status(404)
            .with_body(r#"{"error":{"message":"No assistant found with id 'asst_missing'."}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v1/assistants/asst_1")
            .with_status(200)
            .with_body(r#"{"id":"asst_1","instructions":"be helpful"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.get_identity("asst_missing").await.unwrap(), None);
        assert_eq!(
            client.get_identity("asst_1").await.unwrap(),
            Some("be helpful".to_string())
        );
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/threads")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.create_conversation().await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_server_error_without_retries_surfaces() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/threads")
            .with_status(503)
            .with_body("unavailable")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.create_conversation().await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status: 503, .. }));
        assert!(err.is_retryable());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_retried_up_to_max_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/threads")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(3)
            .create_async()
            .await;

        let mut client = client_for(&server);
        client.max_retries = 2;
        let err = client.create_conversation().await.unwrap_err();
        assert!(err.is_rate_limit());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/threads")
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create_async()
            .await;

        let mut client = client_for(&server);
        client.max_retries = 2;
        let err = client.create_conversation().await.unwrap_err();
        assert!(!err.is_retryable());
        mock.assert_async().await;
    }
}
