//! Transaction payload types

use crate::vm::{ContractEngine, DEFAULT_TOTAL_MEMORY_SIZE};
use crate::{CoreError, CoreResult, Gas};
use serde::{Deserialize, Serialize};

/// Base gas charged for a contract call payload
pub const CALL_BASE_GAS: Gas = 60;

/// Base gas charged for a contract deploy payload
pub const DEPLOY_BASE_GAS: Gas = 60;

/// Payload discriminator carried by every transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    /// Plain value transfer with opaque data
    Binary,
    /// Contract deployment
    Deploy,
    /// Contract function call
    Call,
}

impl PayloadType {
    /// Wire name of this payload type
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::Binary => "binary",
            PayloadType::Deploy => "deploy",
            PayloadType::Call => "call",
        }
    }

    /// Base gas charged before execution for this payload type
    pub fn base_gas(&self) -> Gas {
        match self {
            PayloadType::Binary => 0,
            PayloadType::Deploy => DEPLOY_BASE_GAS,
            PayloadType::Call => CALL_BASE_GAS,
        }
    }
}

/// Contract deployment payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployPayload {
    /// Contract source code
    pub source: String,
    /// Language of the source (e.g. "js", "ts")
    pub source_type: String,
    /// Constructor arguments, JSON-encoded
    pub args: String,
}

impl DeployPayload {
    /// Parse a deploy payload from its JSON wire form
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let payload: DeployPayload = serde_json::from_slice(bytes)?;
        if payload.source.is_empty() {
            return Err(CoreError::InvalidPayload("empty deploy source".to_string()));
        }
        Ok(payload)
    }

    /// Serialize to the JSON wire form
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Contract function call payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPayload {
    /// Function to invoke on the contract
    pub function: String,
    /// Call arguments, JSON-encoded
    pub args: String,
}

impl CallPayload {
    /// Create a call payload, validating the function name
    pub fn new(function: &str, args: &str) -> CoreResult<Self> {
        if !is_public_function_name(function) {
            return Err(CoreError::InvalidCallFunction(function.to_string()));
        }

        Ok(Self {
            function: function.to_string(),
            args: args.to_string(),
        })
    }

    /// Parse a call payload from its JSON wire form
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let payload: CallPayload = serde_json::from_slice(bytes)?;
        Self::new(&payload.function, &payload.args)
    }

    /// Serialize to the JSON wire form
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Execute this call against a contract engine
    ///
    /// `deploy` is the payload the contract was born with; `gas_limit` is
    /// the gas remaining for execution. Returns the instructions consumed
    /// and the call result.
    pub fn execute(
        &self,
        engine: &mut dyn ContractEngine,
        deploy: &DeployPayload,
        gas_limit: Gas,
    ) -> CoreResult<(Gas, String)> {
        if gas_limit == 0 {
            return Err(CoreError::OutOfGasLimit);
        }

        engine.set_execution_limits(gas_limit, DEFAULT_TOTAL_MEMORY_SIZE)?;

        // the error is authoritative; instructions are read either way so
        // the caller can charge partial execution
        let result = engine.call(&deploy.source, &deploy.source_type, &self.function, &self.args);
        let instructions = engine.execution_instructions();
        let output = result?;
        Ok((instructions, output))
    }
}

/// Whether `name` is a callable public function name
///
/// Accepts `[a-zA-Z$_][a-zA-Z0-9$_]*`, excluding the reserved constructor
/// name `init`.
fn is_public_function_name(name: &str) -> bool {
    if name.is_empty() || name == "init" {
        return false;
    }

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '$' || first == '_') {
        return false;
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '$' || c == '_')
}
