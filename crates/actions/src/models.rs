//! Workflow and action data model shared by the executor and every processor.
//!
//! Defined here (rather than in the engine crate) so processors can read the
//! workflow and the accumulated outcomes without a circular dependency.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::resolver::ParameterReference;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Activation state of a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Never triggered.
    Inactive,
    /// Triggered by an HTTP call or a form submission.
    ActiveExternalTrigger,
    /// Triggered by the recurring scheduler from `cron_expression`.
    ActiveRecurring,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::ActiveExternalTrigger => write!(f, "active_external_trigger"),
            Self::ActiveRecurring => write!(f, "active_recurring"),
        }
    }
}

impl std::str::FromStr for WorkflowState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(Self::Inactive),
            "active_external_trigger" => Ok(Self::ActiveExternalTrigger),
            "active_recurring" => Ok(Self::ActiveRecurring),
            other => Err(format!("unknown workflow state: {other}")),
        }
    }
}

/// A complete workflow definition. Read-only to the execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Nil when the definition names no tenant.
    #[serde(default)]
    pub tenant_id: Uuid,
    pub name: String,
    pub state: WorkflowState,
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(name: impl Into<String>, state: WorkflowState, actions: Vec<Action>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: name.into(),
            state,
            actions,
            cron_expression: None,
            created_at: Utc::now(),
        }
    }

    /// Builder-style setter for the recurring trigger expression.
    pub fn with_cron(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    pub fn action(&self, id: Uuid) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Type tag used to select a processor from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateDid,
    UpdateDid,
    DeactivateDid,
    IssueCredential,
    VerifyCredential,
    SendEmail,
    HttpCall,
    ValidateRules,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateDid => "create_did",
            Self::UpdateDid => "update_did",
            Self::DeactivateDid => "deactivate_did",
            Self::IssueCredential => "issue_credential",
            Self::VerifyCredential => "verify_credential",
            Self::SendEmail => "send_email",
            Self::HttpCall => "http_call",
            Self::ValidateRules => "validate_rules",
        };
        f.write_str(name)
    }
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    /// Human-readable label, used in logs and aggregated failure messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub input: ActionInput,
    /// Actions that must have an outcome before this one is dispatched.
    #[serde(default)]
    pub run_after: Vec<Uuid>,
}

impl Action {
    pub fn new(input: ActionInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            input,
            run_after: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn after(mut self, predecessor: Uuid) -> Self {
        self.run_after.push(predecessor);
        self
    }

    pub fn action_type(&self) -> ActionType {
        self.input.action_type()
    }

    /// `name (id)` when named, otherwise just the id.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} ({})", self.id),
            None => self.id.to_string(),
        }
    }
}

/// Type-specific action payload. The variant *is* the action type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "input", rename_all = "snake_case")]
pub enum ActionInput {
    CreateDid(CreateDidInput),
    UpdateDid(UpdateDidInput),
    DeactivateDid(DeactivateDidInput),
    IssueCredential(IssueCredentialInput),
    VerifyCredential(VerifyCredentialInput),
    SendEmail(SendEmailInput),
    HttpCall(HttpCallInput),
    ValidateRules(ValidateRulesInput),
}

impl ActionInput {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::CreateDid(_) => ActionType::CreateDid,
            Self::UpdateDid(_) => ActionType::UpdateDid,
            Self::DeactivateDid(_) => ActionType::DeactivateDid,
            Self::IssueCredential(_) => ActionType::IssueCredential,
            Self::VerifyCredential(_) => ActionType::VerifyCredential,
            Self::SendEmail(_) => ActionType::SendEmail,
            Self::HttpCall(_) => ActionType::HttpCall,
            Self::ValidateRules(_) => ActionType::ValidateRules,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDidInput {
    /// DID method passed to the registrar, e.g. `key` or `web`.
    pub method: ParameterReference,
    /// Optional DID document (JSON) to seed the new DID with.
    #[serde(default)]
    pub did_document: Option<ParameterReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDidInput {
    pub did: ParameterReference,
    /// Replacement DID document (JSON).
    pub did_document: ParameterReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateDidInput {
    pub did: ParameterReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCredentialInput {
    pub issuer_did: ParameterReference,
    pub subject_did: ParameterReference,
    /// Claim name → value provenance.
    #[serde(default)]
    pub claims: BTreeMap<String, ParameterReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCredentialInput {
    /// Serialised credential to verify.
    pub credential: ParameterReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailInput {
    pub to: ParameterReference,
    pub subject: ParameterReference,
    pub body: ParameterReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCallInput {
    /// HTTP method; defaults to `GET`.
    #[serde(default = "default_http_method")]
    pub method: String,
    pub url: ParameterReference,
    #[serde(default)]
    pub headers: BTreeMap<String, ParameterReference>,
    #[serde(default)]
    pub body: Option<ParameterReference>,
}

fn default_http_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRulesInput {
    pub rules: Vec<ValidationRule>,
}

/// One named check over one resolved value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRule {
    pub name: String,
    pub value: ParameterReference,
    pub check: RuleCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCheck {
    /// Value must resolve and be non-empty.
    Required,
    Equals { expected: String },
    MinLength { min: usize },
    MaxLength { max: usize },
    OneOf { allowed: Vec<String> },
    /// Value must parse as JSON.
    IsJson,
}

// ---------------------------------------------------------------------------
// ActionOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    Pending,
    Success,
    Failure,
}

impl fmt::Display for OutcomeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

impl std::str::FromStr for OutcomeState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(format!("unknown outcome state: {other}")),
        }
    }
}

/// Returned when an outcome is finished a second time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("outcome for action {action_id} already finished as {state}")]
pub struct OutcomeAlreadyFinished {
    pub action_id: Uuid,
    pub state: OutcomeState,
}

/// The terminal result of one action within one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: Uuid,
    pub state: OutcomeState,
    pub outcome_json: Option<String>,
    /// `{"message": "..."}` when the action failed.
    pub error_json: Option<String>,
}

impl ActionOutcome {
    pub fn pending(action_id: Uuid) -> Self {
        Self {
            action_id,
            state: OutcomeState::Pending,
            outcome_json: None,
            error_json: None,
        }
    }

    pub fn finish_with_success(
        &mut self,
        payload: impl Into<String>,
    ) -> Result<(), OutcomeAlreadyFinished> {
        self.ensure_pending()?;
        self.state = OutcomeState::Success;
        self.outcome_json = Some(payload.into());
        Ok(())
    }

    pub fn finish_with_failure(
        &mut self,
        message: impl AsRef<str>,
    ) -> Result<(), OutcomeAlreadyFinished> {
        self.ensure_pending()?;
        self.state = OutcomeState::Failure;
        self.error_json = Some(json!({ "message": message.as_ref() }).to_string());
        Ok(())
    }

    pub fn is_success(&self) -> bool {
        self.state == OutcomeState::Success
    }

    /// The human-readable failure message carried in `error_json`.
    pub fn failure_message(&self) -> Option<String> {
        let raw = self.error_json.as_deref()?;
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => value
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_owned)
                .or_else(|| Some(raw.to_owned())),
            Err(_) => Some(raw.to_owned()),
        }
    }

    fn ensure_pending(&self) -> Result<(), OutcomeAlreadyFinished> {
        if self.state != OutcomeState::Pending {
            return Err(OutcomeAlreadyFinished {
                action_id: self.action_id,
                state: self.state,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Read-only view of the run handed to every processor.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Correlates log lines and external calls belonging to one run.
    pub correlation_id: Uuid,
    /// Values supplied by the trigger (HTTP body, form fields, …).
    pub trigger_input: HashMap<String, String>,
}

/// Everything a processor may look at while handling one action.
#[derive(Debug, Clone)]
pub struct ActionProcessingContext {
    pub execution: ExecutionContext,
    /// Outcomes of the actions dispatched so far in this run, in dispatch order.
    pub outcomes: Vec<ActionOutcome>,
    pub workflow: Arc<Workflow>,
    pub cancel: CancellationToken,
}

impl ActionProcessingContext {
    pub fn new(
        execution: ExecutionContext,
        workflow: Arc<Workflow>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            execution,
            outcomes: Vec::new(),
            workflow,
            cancel,
        }
    }

    pub fn outcome_for(&self, action_id: Uuid) -> Option<&ActionOutcome> {
        self.outcomes.iter().find(|o| o.action_id == action_id)
    }
}
