use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use switchyard_core::agent::AgentNode;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{AgentInvoker, TextAgent};
use switchyard_core::types::AgentOutcome;

use crate::output_validator::OutputCleaner;

/// Adapts a [`TextAgent`] into an [`AgentInvoker`].
///
/// Replies go through [`OutputCleaner::parse_output`]. Text that still is not
/// a JSON object after repair is an invocation failure for that agent.
pub struct TextInvoker {
    agent: Arc<dyn TextAgent>,
}

impl TextInvoker {
    pub fn new(agent: Arc<dyn TextAgent>) -> Self {
        Self { agent }
    }
}

impl AgentInvoker for TextInvoker {
    fn invoke<'a>(
        &'a self,
        agent: &'a AgentNode,
        input: &'a str,
        parent_outputs: &'a HashMap<String, AgentOutcome>,
    ) -> BoxFuture<'a, Result<AgentOutcome>> {
        Box::pin(async move {
            let text = self.agent.complete(agent, input, parent_outputs).await?;
            let output = OutputCleaner::parse_output(&text).map_err(|e| {
                debug!(agent_id = %agent.id, error = %e, "Unparseable agent reply");
                SwitchyardError::AgentInvocation {
                    agent: agent.id.clone(),
                    message: e.to_string(),
                }
            })?;
            Ok(AgentOutcome::success(output))
        })
    }
}
