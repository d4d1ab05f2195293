use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::{BridgeError, RegistryError};
use crate::normalize::OutputSpec;
use crate::schema::ValidatedArgs;
use crate::types::{InvocationPlan, ProgramInvocation, RemoteCallPlan, ToolDescriptor};

/// What one call turns into: how to invoke, and how to read the result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPlan {
    pub invocation: InvocationPlan,
    pub output: OutputSpec,
}

impl ToolPlan {
    pub fn program(invocation: ProgramInvocation, output: OutputSpec) -> Self {
        Self {
            invocation: InvocationPlan::Program(invocation),
            output,
        }
    }

    pub fn remote(plan: RemoteCallPlan, output: OutputSpec) -> Self {
        Self {
            invocation: InvocationPlan::Remote(plan),
            output,
        }
    }
}

/// Turns validated arguments into a [`ToolPlan`].
///
/// Implemented for any matching closure or `fn`, which is how catalog
/// entries are usually written.
pub trait Translator: Send + Sync {
    fn translate(&self, args: &ValidatedArgs) -> Result<ToolPlan, BridgeError>;
}

impl<F> Translator for F
where
    F: Fn(&ValidatedArgs) -> Result<ToolPlan, BridgeError> + Send + Sync,
{
    fn translate(&self, args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
        self(args)
    }
}

pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    translator: Box<dyn Translator>,
}

impl RegisteredTool {
    pub fn new(descriptor: ToolDescriptor, translator: impl Translator + 'static) -> Self {
        Self {
            descriptor,
            translator: Box::new(translator),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn translate(&self, args: &ValidatedArgs) -> Result<ToolPlan, BridgeError> {
        self.translator.translate(args)
    }
}

/// Tool table keyed by name. Filled at startup, then shared read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: RegisteredTool) -> Result<&mut Self, RegistryError> {
        if self.tools.contains_key(tool.name()) {
            return Err(RegistryError::DuplicateTool(tool.name().to_string()));
        }
        self.tools.insert(tool.name().to_string(), tool);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Tool listing in the `{name, description, inputSchema}` shape, sorted by name.
    pub fn schemas(&self) -> Vec<Value> {
        self.list()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                json!({
                    "name": tool.descriptor.name,
                    "description": tool.descriptor.description,
                    "inputSchema": tool.descriptor.params.to_json_schema(),
                })
            })
            .collect()
    }
}
