use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::BridgeError;

/// Raw, untyped argument object as delivered by the transport.
pub type Arguments = Map<String, Value>;

/// Semantic type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    /// A number with no fractional part.
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number | Self::Integer => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON type name of a runtime value, for diagnostics.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Contract for a single parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub kind: ParamType,
    pub required: bool,
    pub description: String,
    pub allowed: Option<Vec<String>>,
    pub items: Option<ParamType>,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn new(kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            kind,
            required: false,
            description: description.into(),
            allowed: None,
            items: None,
            default: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new(ParamType::String, description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::new(ParamType::Number, description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(ParamType::Integer, description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(ParamType::Boolean, description)
    }

    pub fn object(description: impl Into<String>) -> Self {
        Self::new(ParamType::Object, description)
    }

    pub fn array_of(items: ParamType, description: impl Into<String>) -> Self {
        let mut spec = Self::new(ParamType::Array, description);
        spec.items = Some(items);
        spec
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn to_json_schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.as_str(),
            "description": self.description,
        });
        if let Some(allowed) = &self.allowed {
            schema["enum"] = json!(allowed);
        }
        if let Some(items) = self.items {
            schema["items"] = json!({ "type": items.as_str() });
        }
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        schema
    }
}

/// Parameter contract of a tool: name to spec, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamContract {
    params: BTreeMap<String, ParamSpec>,
}

impl ParamContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.params.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamSpec)> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|(name, spec)| (name.clone(), spec.to_json_schema()))
            .collect();
        let required: Vec<&String> = self
            .params
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name)
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: ParamContract,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        params: ParamContract,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params,
        }
    }
}

/// A decoded call as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    #[serde(alias = "name")]
    pub tool: String,
    #[serde(default)]
    pub arguments: Arguments,
}

impl CallRequest {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// The only shape ever returned to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResultEnvelope {
    Success { data: Value },
    Failure { message: String },
}

impl ResultEnvelope {
    pub fn success(data: Value) -> Self {
        Self::Success { data }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { message } => Some(message),
        }
    }
}

impl From<Result<Value, BridgeError>> for ResultEnvelope {
    fn from(result: Result<Value, BridgeError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// One element of a program's argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgToken {
    Value(String),
    /// Replaced by the path of the call's scratch file at invocation time.
    ScratchPath,
}

/// Inline content a program only accepts as a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchInput {
    pub file_name: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramInvocation {
    pub program: &'static str,
    pub args: Vec<ArgToken>,
    pub working_dir: Option<PathBuf>,
    pub max_output_bytes: Option<usize>,
    pub scratch: Option<ScratchInput>,
}

impl ProgramInvocation {
    pub fn new(program: &'static str, args: Vec<ArgToken>) -> Self {
        Self {
            program,
            args,
            working_dir: None,
            max_output_bytes: None,
            scratch: None,
        }
    }

    pub fn with_scratch(mut self, scratch: ScratchInput) -> Self {
        self.scratch = Some(scratch);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = Some(limit);
        self
    }

    /// Literal token values, skipping scratch placeholders.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(|t| match t {
            ArgToken::Value(v) => Some(v.as_str()),
            ArgToken::ScratchPath => None,
        })
    }
}

/// Where a remote step parameter gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Literal(Value),
    /// JSON pointer into the output of an earlier step.
    FromStep { step: String, pointer: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStep {
    pub label: String,
    pub operation: String,
    pub params: BTreeMap<String, Binding>,
}

impl RemoteStep {
    pub fn new(label: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            operation: operation.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn literal(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), Binding::Literal(value));
        self
    }

    /// Sets `name` only when `value` is present.
    pub fn maybe(self, name: impl Into<String>, value: Option<Value>) -> Self {
        match value {
            Some(value) => self.literal(name, value),
            None => self,
        }
    }

    pub fn bind(
        mut self,
        name: impl Into<String>,
        step: impl Into<String>,
        pointer: impl Into<String>,
    ) -> Self {
        self.params.insert(
            name.into(),
            Binding::FromStep {
                step: step.into(),
                pointer: pointer.into(),
            },
        );
        self
    }
}

/// One or more remote operations run in order. The call's result is the
/// output of `result_step`, or of the last step when unset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteCallPlan {
    pub steps: Vec<RemoteStep>,
    pub result_step: Option<String>,
}

impl RemoteCallPlan {
    pub fn single(operation: impl Into<String>, params: Map<String, Value>) -> Self {
        let operation = operation.into();
        let mut step = RemoteStep::new(operation.clone(), operation);
        for (name, value) in params {
            step = step.literal(name, value);
        }
        Self {
            steps: vec![step],
            result_step: None,
        }
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: RemoteStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn result_of(mut self, label: impl Into<String>) -> Self {
        self.result_step = Some(label.into());
        self
    }

    pub fn is_composite(&self) -> bool {
        self.steps.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvocationPlan {
    Program(ProgramInvocation),
    Remote(RemoteCallPlan),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_schema_lists_required() {
        let contract = ParamContract::new()
            .param("repo", ParamSpec::string("Repository").required())
            .param(
                "state",
                ParamSpec::string("State").one_of(&["open", "closed"]),
            )
            .param("limit", ParamSpec::integer("Max").default_value(json!(30)));

        let schema = contract.to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["repo"]));
        assert_eq!(schema["properties"]["state"]["enum"], json!(["open", "closed"]));
        assert_eq!(schema["properties"]["limit"]["default"], json!(30));
    }

    #[test]
    fn test_envelope_serializes_tagged() {
        let ok = serde_json::to_value(ResultEnvelope::success(json!({"a": 1}))).unwrap();
        assert_eq!(ok, json!({"status": "success", "data": {"a": 1}}));

        let err = serde_json::to_value(ResultEnvelope::failure("boom")).unwrap();
        assert_eq!(err, json!({"status": "failure", "message": "boom"}));
    }

    #[test]
    fn test_call_request_accepts_name_alias() {
        let req: CallRequest =
            serde_json::from_value(json!({"name": "x", "arguments": {"a": 1}})).unwrap();
        assert_eq!(req.tool, "x");
        assert_eq!(req.arguments["a"], 1);
    }

    #[test]
    fn test_call_request_without_arguments() {
        let req: CallRequest = serde_json::from_value(json!({"tool": "x"})).unwrap();
        assert!(req.arguments.is_empty());
    }
}
