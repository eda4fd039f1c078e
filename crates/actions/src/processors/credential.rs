//! Credential issuance and verification through an injected
//! [`CredentialService`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::models::{Action, ActionInput, ActionProcessingContext, ActionType};
use crate::resolver::resolve_required;
use crate::{ActionError, ActionProcessor};

/// Signing and verification backend.
#[async_trait]
pub trait CredentialService: Send + Sync {
    /// Issue a credential and return it serialised.
    async fn issue(
        &self,
        issuer_did: &str,
        subject_did: &str,
        claims: &BTreeMap<String, String>,
    ) -> anyhow::Result<String>;

    /// Verify a serialised credential; `Ok(false)` means it is not valid.
    async fn verify(&self, credential: &str) -> anyhow::Result<bool>;
}

pub struct IssueCredentialProcessor {
    service: Arc<dyn CredentialService>,
}

impl IssueCredentialProcessor {
    pub fn new(service: Arc<dyn CredentialService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ActionProcessor for IssueCredentialProcessor {
    fn action_type(&self) -> ActionType {
        ActionType::IssueCredential
    }

    async fn process(&self, action: &Action, ctx: &ActionProcessingContext) -> Result<String, ActionError> {
        let ActionInput::IssueCredential(input) = &action.input else {
            return Err(super::unexpected_input(ActionType::IssueCredential, action));
        };

        let issuer = resolve_required("issuer_did", &input.issuer_did, ctx)?;
        let subject = resolve_required("subject_did", &input.subject_did, ctx)?;
        let claims = input
            .claims
            .iter()
            .map(|(name, reference)| Ok((name.clone(), resolve_required(name, reference, ctx)?)))
            .collect::<Result<BTreeMap<_, _>, ActionError>>()?;

        self.service
            .issue(&issuer, &subject, &claims)
            .await
            .map_err(|e| ActionError::External(format!("credential issuance failed: {e:#}")))
    }
}

pub struct VerifyCredentialProcessor {
    service: Arc<dyn CredentialService>,
}

impl VerifyCredentialProcessor {
    pub fn new(service: Arc<dyn CredentialService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ActionProcessor for VerifyCredentialProcessor {
    fn action_type(&self) -> ActionType {
        ActionType::VerifyCredential
    }

    async fn process(&self, action: &Action, ctx: &ActionProcessingContext) -> Result<String, ActionError> {
        let ActionInput::VerifyCredential(input) = &action.input else {
            return Err(super::unexpected_input(ActionType::VerifyCredential, action));
        };

        let credential = resolve_required("credential", &input.credential, ctx)?;
        let valid = self
            .service
            .verify(&credential)
            .await
            .map_err(|e| ActionError::External(format!("credential verification failed: {e:#}")))?;

        if !valid {
            return Err(ActionError::InvalidInput("credential is not valid".into()));
        }
        Ok(json!({ "verified": true }).to_string())
    }
}
