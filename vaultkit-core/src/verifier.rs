//! Restricted verifier-program form.
//!
//! A predicate compiles to a closed, serializable instruction list instead
//! of free-form script text. The sandbox executes it with an explicit
//! interpreter; the real custodian network receives the canonical JSON of
//! the program as its published "source". Keeping the instruction set closed
//! makes the host capability surface exhaustively enumerable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{VaultError, VaultResult};

/// Entry point name every verifier program is invoked under.
pub const DEFAULT_ENTRY: &str = "go";

/// An operand evaluated at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// A literal JSON value baked into the program.
    Lit {
        /// The literal value.
        value: Value,
    },
    /// A named parameter supplied at invocation time.
    Param {
        /// Parameter name; must appear in [`VerifierProgram::params`].
        name: String,
    },
    /// The caller address asserted by the auth context.
    CallerAddress,
}

impl Expr {
    /// Shorthand for a string literal operand.
    #[must_use]
    pub fn lit_str(value: &str) -> Self {
        Self::Lit {
            value: Value::String(value.to_string()),
        }
    }

    /// Shorthand for a named parameter operand.
    #[must_use]
    pub fn param(name: &str) -> Self {
        Self::Param {
            name: name.to_string(),
        }
    }
}

/// One verifier instruction.
///
/// Programs are straight-line: there is no branching or looping construct,
/// so execution length is bounded by program length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Append a line to the execution log.
    Emit {
        /// Human-readable message.
        message: String,
    },
    /// Deny unless the asserted caller equals `address`.
    RequireCaller {
        /// Expected caller address.
        address: Expr,
    },
    /// Generic read-only contract check: the raw `eth_call` result's
    /// trailing byte is interpreted as a boolean; deny when false.
    ContractCheck {
        /// Contract address to read.
        address: Expr,
        /// Full method signature, e.g. `isApproved(address)`.
        method: String,
        /// Arguments, each encoded as one 32-byte word.
        args: Vec<Expr>,
    },
    /// Read the settlement ledger and deny unless the amount recorded for
    /// `(commitment, caller)` is at least `minimum`.
    SettlementCheck {
        /// Settlement-tracker contract address.
        address: Expr,
        /// Commitment binding vault, tag and price.
        commitment: Expr,
        /// Minimum acceptable paid amount.
        minimum: Expr,
    },
    /// Recombine the protected value whose content hash matches this
    /// invocation. The host releases the plaintext through the response
    /// sink only when `content_hash` equals the invocation-bound hash.
    RecombineKey {
        /// Content hash the program asks to recombine.
        content_hash: Expr,
    },
    /// Record a successful verdict and stop.
    Allow,
    /// Record a denial and stop.
    Deny {
        /// Reason surfaced to the caller.
        reason: String,
    },
}

/// A compiled access-policy verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierProgram {
    /// Entry point name (informational; programs have a single entry).
    pub entry: String,
    /// Declared parameter names, bound by the key-release condition.
    pub params: Vec<String>,
    /// Instructions executed in order.
    pub steps: Vec<Step>,
}

impl VerifierProgram {
    /// Builds a program with the conventional entry point.
    #[must_use]
    pub fn new(params: Vec<String>, steps: Vec<Step>) -> Self {
        Self {
            entry: DEFAULT_ENTRY.to_string(),
            params,
            steps,
        }
    }

    /// Renders the canonical JSON source published to the code registry.
    ///
    /// Struct fields serialize in declaration order, so identical programs
    /// always render identical source text.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Serialization`] if the program cannot be
    /// rendered (not expected for well-formed values).
    pub fn to_source(&self) -> VaultResult<String> {
        serde_json::to_string(self).map_err(VaultError::from)
    }

    /// Parses a program from its canonical JSON source.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::SandboxExecution`] when the source is not a
    /// well-formed program; the sandbox normalizes this into a structured
    /// failure rather than surfacing a serialization fault.
    pub fn from_source(source: &str) -> VaultResult<Self> {
        serde_json::from_str(source)
            .map_err(|err| VaultError::SandboxExecution(format!("invalid verifier source: {err}")))
    }
}
