//! Tool registry for InboxPilot
//!
//! This module provides the `ToolRegistry` struct for registering tools,
//! resolving model requests to handlers, validating arguments against each
//! tool's JSON Schema, and executing calls with a timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonschema::Validator;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::RegistryError;
use crate::providers::ToolDefinition;

use super::{Tool, ToolCategory, ToolContext, ToolFailure, ToolFailureKind, ToolInvocation, ToolResult};

/// Result of one registry execution, with the metadata the agent loop needs.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    pub result: ToolResult,
    /// Category of the resolved tool, `None` when the name was unknown
    pub category: Option<ToolCategory>,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ToolExecution {
    fn rejected(failure: ToolFailure, category: Option<ToolCategory>) -> Self {
        Self {
            result: ToolResult::Failure(failure),
            category,
            timed_out: false,
            duration_ms: 0,
        }
    }
}

struct RegisteredTool {
    tool: Box<dyn Tool>,
    validator: Validator,
}

/// A registry that holds tools by unique name.
///
/// Registration order is preserved so the model sees tools in a stable order.
///
/// # Example
///
/// ```rust
/// use inboxpilot::tools::ToolRegistry;
///
/// let registry = ToolRegistry::new();
/// assert!(registry.names().is_empty());
/// assert!(registry.resolve("ReplyEmail").is_err());
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is taken or the parameter schema
    /// does not compile.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }

        let validator =
            jsonschema::validator_for(&tool.parameters()).map_err(|e| RegistryError::InvalidSchema {
                tool: name.clone(),
                message: e.to_string(),
            })?;

        info!(tool = %name, category = %tool.category(), "Registering tool");
        self.index.insert(name, self.tools.len());
        self.tools.push(RegisteredTool { tool, validator });
        Ok(())
    }

    /// Look up a tool by exact name.
    pub fn resolve(&self, name: &str) -> Result<&dyn Tool, RegistryError> {
        self.index
            .get(name)
            .map(|&i| self.tools[i].tool.as_ref())
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions passed to the model each step.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition::new(t.tool.name(), t.tool.description(), t.tool.parameters()))
            .collect()
    }

    /// Check `args` against the named tool's schema.
    pub fn validate(&self, name: &str, args: &Value) -> Result<(), ToolFailure> {
        let entry = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| ToolFailure::new(ToolFailureKind::UnknownTool, format!("Tool not found: {}", name)))?;

        let problems: Vec<String> = entry
            .validator
            .iter_errors(args)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ToolFailure::invalid_arguments(problems.join("; ")))
        }
    }

    /// Resolve, validate and execute one invocation.
    ///
    /// Unknown names and schema violations are returned as failures without
    /// running any handler. A handler that exceeds its timeout is dropped and
    /// reported as `Timeout`.
    pub async fn execute(
        &self,
        invocation: &ToolInvocation,
        ctx: &ToolContext,
        default_timeout: Duration,
    ) -> ToolExecution {
        let name = invocation.name.as_str();
        let tool = match self.resolve(name) {
            Ok(tool) => tool,
            Err(e) => {
                warn!(tool = name, "Model requested unknown tool");
                return ToolExecution::rejected(
                    ToolFailure::new(ToolFailureKind::UnknownTool, e.to_string()),
                    None,
                );
            }
        };
        let category = tool.category();

        if let Err(failure) = self.validate(name, &invocation.arguments) {
            warn!(tool = name, error = %failure.message, "Tool arguments rejected");
            return ToolExecution::rejected(failure, Some(category));
        }

        let limit = tool.timeout().unwrap_or(default_timeout);
        let start = Instant::now();
        let outcome = tokio::time::timeout(limit, tool.execute(invocation.arguments.clone(), ctx)).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let timeout_ms = limit.as_millis() as u64;

        let (result, timed_out) = match outcome {
            Ok(Ok(payload)) => {
                info!(tool = name, duration_ms, "Tool executed successfully");
                (ToolResult::Success(payload), false)
            }
            Ok(Err(failure)) => {
                error!(tool = name, error = %failure, duration_ms, "Tool execution failed");
                (ToolResult::Failure(failure), false)
            }
            Err(_) => {
                error!(tool = name, timeout_ms, "Tool execution timed out");
                (
                    ToolResult::Failure(ToolFailure::new(
                        ToolFailureKind::Timeout,
                        format!("{} did not finish within {}ms", name, timeout_ms),
                    )),
                    true,
                )
            }
        };

        ToolExecution {
            result,
            category: Some(category),
            timed_out,
            duration_ms,
        }
    }
}
