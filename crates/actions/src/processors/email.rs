//! Sends an email through an injected [`Mailer`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::models::{Action, ActionInput, ActionProcessingContext, ActionType};
use crate::resolver::resolve_required;
use crate::{ActionError, ActionProcessor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery backend (SMTP relay, provider API, …).
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `message`, returning a provider message id.
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<String>;
}

pub struct SendEmailProcessor {
    mailer: Arc<dyn Mailer>,
}

impl SendEmailProcessor {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl ActionProcessor for SendEmailProcessor {
    fn action_type(&self) -> ActionType {
        ActionType::SendEmail
    }

    async fn process(&self, action: &Action, ctx: &ActionProcessingContext) -> Result<String, ActionError> {
        let ActionInput::SendEmail(input) = &action.input else {
            return Err(super::unexpected_input(ActionType::SendEmail, action));
        };

        let message = EmailMessage {
            to: resolve_required("to", &input.to, ctx)?,
            subject: resolve_required("subject", &input.subject, ctx)?,
            body: resolve_required("body", &input.body, ctx)?,
        };
        if !message.to.contains('@') {
            return Err(ActionError::InvalidInput(format!(
                "'{}' is not an email address",
                message.to
            )));
        }

        let message_id = self
            .mailer
            .send(&message)
            .await
            .map_err(|e| ActionError::External(format!("email delivery failed: {e:#}")))?;

        info!(action_id = %action.id, %message_id, "email sent");
        Ok(json!({ "messageId": message_id, "to": message.to }).to_string())
    }
}
