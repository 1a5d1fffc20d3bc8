//! Process definition model
//!
//! The parsed shape of a process: named flows made of steps. Producing this from
//! the textual DSL happens elsewhere; the compiler only needs this structure, and
//! it round-trips through JSON so definitions can be loaded from disk.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the flow started when no other entry point is configured
pub const DEFAULT_ENTRY_POINT: &str = "default";

/* ===================== Location ===================== */

/// Source location of a step, used for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Location {
    /// Line (1-indexed, 0 when unknown)
    #[serde(default)]
    pub line: u32,
    /// Column (1-indexed, 0 when unknown)
    #[serde(default)]
    pub column: u32,
    /// File the step was parsed from
    #[serde(default, rename = "fileName", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line,
            column,
            file_name: None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file_name {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "line {}, col {}", self.line, self.column),
        }
    }
}

/* ===================== Process Definition ===================== */

/// A complete, parsed process definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProcessDefinition {
    #[serde(default)]
    pub configuration: ProcessConfiguration,
    /// Flow name -> ordered steps
    pub flows: BTreeMap<String, Vec<Step>>,
}

/// Process-level settings carried by the definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfiguration {
    #[serde(default = "default_entry_point", rename = "entryPoint")]
    pub entry_point: String,
    /// Initial variables of the entry flow
    #[serde(default)]
    pub arguments: Map<String, JsonValue>,
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

impl Default for ProcessConfiguration {
    fn default() -> Self {
        Self {
            entry_point: default_entry_point(),
            arguments: Map::new(),
        }
    }
}

impl ProcessDefinition {
    /// Create a definition from flows with the default configuration
    pub fn new(flows: BTreeMap<String, Vec<Step>>) -> Self {
        Self {
            configuration: ProcessConfiguration::default(),
            flows,
        }
    }

    pub fn flow(&self, name: &str) -> Option<&[Step]> {
        self.flows.get(name).map(|steps| steps.as_slice())
    }

    pub fn from_json(source: &str) -> serde_json::Result<Self> {
        serde_json::from_str(source)
    }
}

/// Load a process definition from a JSON file
pub fn load(path: impl AsRef<Path>) -> anyhow::Result<ProcessDefinition> {
    use anyhow::Context;

    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read process definition {}", path.display()))?;
    ProcessDefinition::from_json(&source)
        .with_context(|| format!("Failed to parse process definition {}", path.display()))
}

/* ===================== Steps ===================== */

/// One parsed DSL instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub location: Location,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            location: Location::default(),
            kind,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

/// Retry options of a task call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryOptions {
    /// How many times the call is retried after the first failure
    pub times: u32,
}

/// Step kind with its kind-specific options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepKind {
    /// Call a named task implementation
    Task {
        name: String,
        #[serde(default)]
        input: Map<String, JsonValue>,
        /// Variable receiving the task output
        #[serde(default, skip_serializing_if = "Option::is_none")]
        out: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryOptions>,
        #[serde(default, rename = "ignoreErrors")]
        ignore_errors: bool,
    },
    /// Raise an exception
    Throw { exception: JsonValue },
    /// Assign flow-wide variables
    Set { vars: Map<String, JsonValue> },
    /// Conditional branch
    If {
        expression: String,
        then: Vec<Step>,
        #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
        otherwise: Option<Vec<Step>>,
    },
    /// Wait for an external event
    Suspend { event: String },
    /// Invoke another flow of the same process
    Call {
        flow: String,
        #[serde(default)]
        input: Map<String, JsonValue>,
        /// Variables copied back into the caller once the flow ends
        #[serde(default)]
        out: Vec<String>,
    },
    /// Run steps with an error handler
    Try {
        steps: Vec<Step>,
        error: Vec<Step>,
    },
    /// Run branches as independent threads and wait for all of them
    Parallel {
        branches: Vec<Vec<Step>>,
        #[serde(default)]
        out: Vec<String>,
    },
}

impl StepKind {
    /// Short name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Task { .. } => "task",
            StepKind::Throw { .. } => "throw",
            StepKind::Set { .. } => "set",
            StepKind::If { .. } => "if",
            StepKind::Suspend { .. } => "suspend",
            StepKind::Call { .. } => "call",
            StepKind::Try { .. } => "try",
            StepKind::Parallel { .. } => "parallel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_from_json() {
        let source = r#"{
            "configuration": { "entryPoint": "main" },
            "flows": {
                "main": [
                    { "type": "set", "location": { "line": 2, "column": 3 }, "vars": { "x": 1 } },
                    { "type": "task", "name": "echo", "input": { "v": "${x}" }, "out": "result" }
                ]
            }
        }"#;

        let pd = ProcessDefinition::from_json(source).unwrap();
        assert_eq!(pd.configuration.entry_point, "main");

        let steps = pd.flow("main").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].location, Location::new(2, 3));
        assert!(matches!(&steps[1].kind, StepKind::Task { name, out: Some(out), .. } if name == "echo" && out == "result"));
    }

    #[test]
    fn test_default_entry_point() {
        let pd: ProcessDefinition = serde_json::from_value(json!({ "flows": {} })).unwrap();
        assert_eq!(pd.configuration.entry_point, DEFAULT_ENTRY_POINT);
        assert!(pd.configuration.arguments.is_empty());
    }

    #[test]
    fn test_if_step_else_branch() {
        let step: Step = serde_json::from_value(json!({
            "type": "if",
            "expression": "${x > 1}",
            "then": [],
            "else": [{ "type": "throw", "exception": "small" }]
        }))
        .unwrap();

        let StepKind::If { otherwise: Some(otherwise), .. } = step.kind else {
            unreachable!("Expected if step with else branch, got {:?}", step.kind);
        };
        assert_eq!(otherwise.len(), 1);
    }
}
