//! `call-webhook` action.

use super::dispatcher::{ActionDispatcher, Outcome};
use crate::collaborators::WebhookRequest;
use crate::error::ActionError;

/// Perform the call and report the response status. Non-2xx responses
/// fail the action but keep the response in its output.
pub(super) async fn run(
    dispatcher: &ActionDispatcher<'_>,
    request: WebhookRequest,
) -> Result<Outcome, ActionError> {
    if request.url.trim().is_empty() {
        return Err(ActionError::MissingField("url"));
    }

    let url = request.url.clone();
    let method = request.method;
    let response = dispatcher.engine().webhook_caller().call(request).await?;

    let output = serde_json::json!({
        "url": url,
        "method": method,
        "status": response.status,
        "body": response.body,
    });

    if response.is_success() {
        Ok(Outcome::success(output))
    } else {
        Ok(Outcome::failed(
            output,
            format!("Webhook returned HTTP {}", response.status),
        ))
    }
}
