/// Task handlers invoked by the execution engine
///
/// A handler receives the resolved inputs of one workflow node and returns its outputs.
/// Only tasks that need no external runtime are implemented here; browser and AI tasks
/// are provided by the host through [`crate::tasks::TaskRegistry::register_handler`].

use crate::tasks::registry::TaskType;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Runtime view of one node handed to its handler
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub execution_id: String,
    pub node_id: String,
    pub task_type: TaskType,
    /// Input name -> value (static node inputs overlaid by upstream outputs)
    pub inputs: HashMap<String, Value>,
}

impl TaskContext {
    /// Read an input as text; JSON values other than strings are serialized
    pub fn input_str(&self, name: &str) -> Result<String> {
        match self.inputs.get(name) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Null) | None => Err(anyhow::anyhow!(
                "Input '{}' is missing for node '{}'",
                name,
                self.node_id
            )),
            Some(other) => Ok(other.to_string()),
        }
    }
}

/// What the engine should do after a handler returns
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Node finished; outputs are keyed by output name
    Completed(HashMap<String, Value>),
    /// Node finished and the execution must wait for a human approval
    AwaitApproval,
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutcome>;
}

/// Parse a JSON object out of a string input
fn parse_object(ctx: &TaskContext, name: &str) -> Result<serde_json::Map<String, Value>> {
    let raw = ctx.input_str(name)?;
    match serde_json::from_str::<Value>(&raw).with_context(|| format!("Input '{}' is not valid JSON", name))? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow::anyhow!("Input '{}' must be a JSON object", name)),
    }
}

/// READ_PROPERTY_FROM_JSON
pub struct ReadPropertyFromJsonHandler;

#[async_trait]
impl TaskHandler for ReadPropertyFromJsonHandler {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutcome> {
        let object = parse_object(&ctx, "JSON")?;
        let property = ctx.input_str("Property name")?;

        let value = object
            .get(&property)
            .ok_or_else(|| anyhow::anyhow!("Property '{}' not found", property))?;
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        Ok(TaskOutcome::Completed(HashMap::from([(
            "Property value".to_string(),
            Value::String(value),
        )])))
    }
}

/// ADD_PROPERTY_TO_JSON
pub struct AddPropertyToJsonHandler;

#[async_trait]
impl TaskHandler for AddPropertyToJsonHandler {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutcome> {
        let mut object = parse_object(&ctx, "JSON")?;
        let property = ctx.input_str("Property name")?;
        let value = ctx.input_str("Property value")?;

        object.insert(property, Value::String(value));

        Ok(TaskOutcome::Completed(HashMap::from([(
            "Update JSON".to_string(),
            Value::String(Value::Object(object).to_string()),
        )])))
    }
}

/// DELIVER_VIA_WEBHOOK: POST the body to the target URL
pub struct DeliverViaWebhookHandler {
    client: reqwest::Client,
}

impl DeliverViaWebhookHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskHandler for DeliverViaWebhookHandler {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutcome> {
        let url = ctx.input_str("Target URL")?;
        let body = ctx.input_str("Body")?;

        tracing::info!("📤 Delivering webhook for node '{}' to {}", ctx.node_id, url);

        // JSON bodies go out as JSON, anything else as plain text
        let request = match serde_json::from_str::<Value>(&body) {
            Ok(json) => self.client.post(&url).json(&json),
            Err(_) => self.client.post(&url).body(body),
        };
        let response = request
            .send()
            .await
            .with_context(|| format!("Webhook delivery to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("Webhook {} responded with status {}", url, status));
        }

        Ok(TaskOutcome::Completed(HashMap::new()))
    }
}

/// APPROVAL_GATE: stop the execution until someone approves it
pub struct ApprovalGateHandler;

#[async_trait]
impl TaskHandler for ApprovalGateHandler {
    async fn run(&self, ctx: TaskContext) -> Result<TaskOutcome> {
        if let Ok(message) = ctx.input_str("Message") {
            tracing::info!("✋ Approval requested by node '{}': {}", ctx.node_id, message);
        }
        Ok(TaskOutcome::AwaitApproval)
    }
}
