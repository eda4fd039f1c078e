//! DID create / update / deactivate through a registrar job.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{info, instrument};

use crate::models::{Action, ActionInput, ActionProcessingContext, ActionType};
use crate::poller::{AsyncJobPoller, JobOperation, JobTransport};
use crate::resolver::{resolve_optional, resolve_required};
use crate::{ActionError, ActionProcessor};

/// Submits a registrar job for one DID operation and waits for it through
/// the [`AsyncJobPoller`]. Register one instance per operation.
pub struct DidProcessor {
    operation: JobOperation,
    transport: Arc<dyn JobTransport>,
    poller: AsyncJobPoller,
}

impl DidProcessor {
    pub fn new(operation: JobOperation, transport: Arc<dyn JobTransport>, poller: AsyncJobPoller) -> Self {
        Self {
            operation,
            transport,
            poller,
        }
    }

    pub fn create(transport: Arc<dyn JobTransport>, poller: AsyncJobPoller) -> Self {
        Self::new(JobOperation::Create, transport, poller)
    }

    pub fn update(transport: Arc<dyn JobTransport>, poller: AsyncJobPoller) -> Self {
        Self::new(JobOperation::Update, transport, poller)
    }

    pub fn deactivate(transport: Arc<dyn JobTransport>, poller: AsyncJobPoller) -> Self {
        Self::new(JobOperation::Deactivate, transport, poller)
    }

    /// Build the registrar request body from the resolved inputs.
    fn request_body(&self, action: &Action, ctx: &ActionProcessingContext) -> Result<Value, ActionError> {
        match (&self.operation, &action.input) {
            (JobOperation::Create, ActionInput::CreateDid(input)) => {
                let method = resolve_required("method", &input.method, ctx)?;
                let mut body = Map::new();
                body.insert("method".into(), Value::String(method));
                if let Some(document) = resolve_optional(input.did_document.as_ref(), ctx) {
                    body.insert("didDocument".into(), parse_document(&document)?);
                }
                body.insert("options".into(), json!({}));
                body.insert("secret".into(), json!({}));
                Ok(Value::Object(body))
            }
            (JobOperation::Update, ActionInput::UpdateDid(input)) => {
                let did = resolve_required("did", &input.did, ctx)?;
                let document = resolve_required("did_document", &input.did_document, ctx)?;
                Ok(json!({
                    "did": did,
                    "didDocumentOperation": ["setDidDocument"],
                    "didDocument": [parse_document(&document)?],
                }))
            }
            (JobOperation::Deactivate, ActionInput::DeactivateDid(input)) => {
                let did = resolve_required("did", &input.did, ctx)?;
                Ok(json!({ "did": did }))
            }
            _ => Err(super::unexpected_input(self.action_type(), action)),
        }
    }
}

fn parse_document(raw: &str) -> Result<Value, ActionError> {
    serde_json::from_str(raw)
        .map_err(|e| ActionError::InvalidInput(format!("DID document is not valid JSON: {e}")))
}

#[async_trait]
impl ActionProcessor for DidProcessor {
    fn action_type(&self) -> ActionType {
        match self.operation {
            JobOperation::Create => ActionType::CreateDid,
            JobOperation::Update => ActionType::UpdateDid,
            JobOperation::Deactivate => ActionType::DeactivateDid,
        }
    }

    #[instrument(skip_all, fields(action_id = %action.id, operation = %self.operation))]
    async fn process(&self, action: &Action, ctx: &ActionProcessingContext) -> Result<String, ActionError> {
        let body = self.request_body(action, ctx)?;
        let result = self
            .poller
            .run(self.transport.as_ref(), self.operation, &body, &ctx.cancel)
            .await?;
        info!("registrar job completed");
        Ok(result)
    }
}
