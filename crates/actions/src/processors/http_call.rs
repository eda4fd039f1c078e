//! Calls an HTTP endpoint with resolved URL, headers and body.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::models::{Action, ActionInput, ActionProcessingContext, ActionType};
use crate::resolver::{resolve_optional, resolve_required};
use crate::{ActionError, ActionProcessor};

pub struct HttpCallProcessor {
    client: reqwest::Client,
}

impl HttpCallProcessor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpCallProcessor {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl ActionProcessor for HttpCallProcessor {
    fn action_type(&self) -> ActionType {
        ActionType::HttpCall
    }

    #[instrument(skip_all, fields(action_id = %action.id))]
    async fn process(&self, action: &Action, ctx: &ActionProcessingContext) -> Result<String, ActionError> {
        let ActionInput::HttpCall(input) = &action.input else {
            return Err(super::unexpected_input(ActionType::HttpCall, action));
        };

        let method = Method::from_bytes(input.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ActionError::InvalidInput(format!("unsupported HTTP method '{}'", input.method)))?;
        let url = resolve_required("url", &input.url, ctx)?;
        let url = reqwest::Url::parse(&url)
            .map_err(|e| ActionError::InvalidInput(format!("invalid url '{url}': {e}")))?;

        let mut request = self
            .client
            .request(method, url)
            .header("x-correlation-id", ctx.execution.correlation_id.to_string());
        for (name, reference) in &input.headers {
            let value = resolve_required(name, reference, ctx)?;
            request = request.header(name.as_str(), value);
        }
        if let Some(body) = resolve_optional(input.body.as_ref(), ctx) {
            request = request.body(body);
        }

        let response = tokio::select! {
            response = request.send() => response,
            _ = ctx.cancel.cancelled() => {
                return Err(ActionError::Cancelled("http call cancelled".into()));
            }
        }
        .map_err(|e| ActionError::External(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ActionError::External(format!("reading response body failed: {e}")))?;
        debug!(status = status.as_u16(), "http call completed");

        if !status.is_success() {
            return Err(ActionError::External(format!(
                "endpoint responded with status {}: {text}",
                status.as_u16()
            )));
        }

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(json!({ "status": status.as_u16(), "body": body }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::models::HttpCallInput;
    use crate::processors::test_support::context;
    use crate::ParameterReference;

    fn call(method: &str, url: ParameterReference) -> Action {
        Action::new(ActionInput::HttpCall(HttpCallInput {
            method: method.into(),
            url,
            headers: BTreeMap::new(),
            body: None,
        }))
    }

    #[tokio::test]
    async fn unresolved_url_fails_before_any_request() {
        let action = call("POST", ParameterReference::trigger("callback"));
        let ctx = context(&action, &[], vec![]);

        let err = HttpCallProcessor::default().process(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::MissingParameter { ref parameter, .. } if parameter == "url"));
    }

    #[tokio::test]
    async fn malformed_url_is_invalid_input() {
        let action = call("GET", ParameterReference::literal("not a url"));
        let ctx = context(&action, &[], vec![]);

        let err = HttpCallProcessor::default().process(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn bogus_method_is_invalid_input() {
        let action = call("GET /", ParameterReference::literal("http://localhost/"));
        let ctx = context(&action, &[], vec![]);

        let err = HttpCallProcessor::default().process(&action, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("unsupported HTTP method"));
    }

    #[tokio::test]
    async fn json_response_is_wrapped_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/signup"))
            .and(header("x-tenant", "acme"))
            .and(body_string("ada@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accepted": true })))
            .expect(1)
            .mount(&server)
            .await;

        let mut action = call("post", ParameterReference::literal(format!("{}/hooks/signup", server.uri())));
        if let ActionInput::HttpCall(input) = &mut action.input {
            input.headers.insert("x-tenant".into(), ParameterReference::literal("acme"));
            input.body = Some(ParameterReference::trigger("email"));
        }
        let ctx = context(&action, &[("email", "ada@example.com")], vec![]);

        let payload = HttpCallProcessor::default().process(&action, &ctx).await.unwrap();

        let payload: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(payload, json!({ "status": 200, "body": { "accepted": true } }));
    }

    #[tokio::test]
    async fn correlation_id_is_forwarded() {
        let server = MockServer::start().await;
        let action = call("GET", ParameterReference::literal(format!("{}/ping", server.uri())));
        let ctx = context(&action, &[], vec![]);
        Mock::given(method("GET"))
            .and(header("x-correlation-id", ctx.execution.correlation_id.to_string().as_str()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let payload = HttpCallProcessor::default().process(&action, &ctx).await.unwrap();

        let payload: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(payload["status"], 204);
    }

    #[tokio::test]
    async fn text_response_body_is_kept_as_string() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain ok"))
            .mount(&server)
            .await;

        let action = call("GET", ParameterReference::literal(server.uri()));
        let ctx = context(&action, &[], vec![]);

        let payload = HttpCallProcessor::default().process(&action, &ctx).await.unwrap();

        let payload: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(payload, json!({ "status": 200, "body": "plain ok" }));
    }

    #[tokio::test]
    async fn error_status_is_an_external_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let action = call("GET", ParameterReference::literal(server.uri()));
        let ctx = context(&action, &[], vec![]);

        let err = HttpCallProcessor::default().process(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::External(_)));
        let message = err.to_string();
        assert!(message.contains("500"), "{message}");
        assert!(message.contains("upstream down"), "{message}");
    }
}
