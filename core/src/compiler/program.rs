//! Compiled program
//!
//! A process definition plus a lazily filled cache of compiled flows. The
//! program is not part of the serialized state: after a resume it is rebuilt
//! from the definition, and the fingerprint ties a state to the definition it
//! was created from.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::{CompileResult, Compiler};
use crate::model::{ProcessDefinition, Step};
use crate::vm::types::Command;

/// Stable hash of a definition (hex SHA-256 of its JSON form)
pub fn fingerprint(definition: &ProcessDefinition) -> String {
    let bytes = serde_json::to_vec(definition).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct Program {
    definition: ProcessDefinition,
    fingerprint: String,
    compiler: Compiler,
    compiled: HashMap<String, Command>,
}

impl Program {
    pub fn new(definition: ProcessDefinition) -> Self {
        let fingerprint = fingerprint(&definition);
        Self {
            definition,
            fingerprint,
            compiler: Compiler::new(),
            compiled: HashMap::new(),
        }
    }

    pub fn definition(&self) -> &ProcessDefinition {
        &self.definition
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Compiled body of a flow, compiling it on first use
    pub fn flow(&mut self, name: &str) -> CompileResult<&Command> {
        if !self.compiled.contains_key(name) {
            let command = self.compiler.compile_flow(&self.definition, name)?;
            tracing::debug!(flow = %name, "Compiled flow");
            self.compiled.insert(name.to_string(), command);
        }
        self.compiled
            .get(name)
            .ok_or_else(|| super::CompileError::FlowNotFound {
                name: name.to_string(),
                location: None,
            })
    }

    pub fn is_compiled(&self, name: &str) -> bool {
        self.compiled.contains_key(name)
    }

    pub fn compile_step(&self, step: &Step) -> CompileResult<Command> {
        self.compiler.compile_step(&self.definition, step)
    }

    /// Compile every flow up front, surfacing all static errors
    pub fn compile_all(&mut self) -> CompileResult<()> {
        let names: Vec<String> = self.definition.flows.keys().cloned().collect();
        for name in names {
            self.flow(&name)?;
        }
        Ok(())
    }
}

impl From<ProcessDefinition> for Program {
    fn from(definition: ProcessDefinition) -> Self {
        Self::new(definition)
    }
}
