//! Declarative access policies and their compiler.
//!
//! A [`Predicate`] is a closed tagged variant; each variant compiles, as a
//! pure function of its parameters, into a verifier program, a structured
//! key-release condition and an audit descriptor. Determinism enables
//! auditing and caching: identical parameters always produce identical
//! output, down to the published source text.

use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::VaultResult;
use crate::kms::KeyManagementProvider;
use crate::verifier::{Expr, Step, VerifierProgram, DEFAULT_ENTRY};

/// The structured expression a key-custodian network evaluates before
/// releasing a wrapped key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessCondition {
    /// The caller must control the given wallet address.
    WalletOwnership {
        /// Required caller address.
        address: Address,
        /// Chain the ownership proof is anchored to.
        chain: String,
    },
    /// The custodians must run the referenced program with the given
    /// parameters and observe the expected verdict.
    ProgramApproval {
        /// Content-addressed reference to the published verifier source.
        program_ref: String,
        /// Entry point to invoke.
        entry: String,
        /// Named parameters bound at invocation time.
        params: Map<String, Value>,
        /// Expected verdict rendering (conventionally `"true"`).
        expected: String,
    },
}

impl AccessCondition {
    /// Returns the named parameters a decrypt invocation must carry.
    #[must_use]
    pub fn invocation_params(&self) -> Map<String, Value> {
        match self {
            Self::WalletOwnership { address, chain } => {
                let mut params = Map::new();
                params.insert("address".to_string(), Value::String(address.to_string()));
                params.insert("chain".to_string(), Value::String(chain.clone()));
                params
            }
            Self::ProgramApproval { params, .. } => params.clone(),
        }
    }

    /// Returns the published program reference, when the condition has one.
    #[must_use]
    pub fn program_reference(&self) -> Option<&str> {
        match self {
            Self::WalletOwnership { .. } => None,
            Self::ProgramApproval { program_ref, .. } => Some(program_ref),
        }
    }
}

/// Audit record persisted inside each manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateDescriptor {
    /// Predicate variant identifier (`"identity"`, `"payment"`).
    pub kind: String,
    /// Human-readable summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The compiled key-release condition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<AccessCondition>,
    /// Variant-specific parameters worth auditing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

/// Parameters for [`Predicate::Identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityParams {
    /// The only caller address allowed to recover the key.
    pub address: Address,
    /// Chain name the condition is anchored to.
    pub chain: String,
}

/// Parameters for [`Predicate::Payment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentParams {
    /// Minimum settled amount (smallest token unit).
    pub price: U256,
    /// Commitment binding vault, tag and price; see [`compute_tag_commitment`].
    pub commitment: B256,
    /// Chain name the settlement ledger lives on.
    pub chain: String,
    /// Settlement-tracker contract address.
    pub settlement_address: Address,
}

/// A declarative access policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Accept only a specified caller address.
    Identity(IdentityParams),
    /// Accept a caller only if the settlement ledger records a payment of at
    /// least the configured price against the commitment.
    Payment(PaymentParams),
}

/// Output of [`Predicate::compile`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    /// The verifier program, carried inline in the stored bundle.
    pub program: VerifierProgram,
    /// The key-release condition handed to the key-management provider.
    pub condition: AccessCondition,
    /// The audit descriptor persisted in the manifest entry.
    pub descriptor: PredicateDescriptor,
}

impl Predicate {
    /// Builds an identity predicate.
    #[must_use]
    pub const fn identity(address: Address, chain: String) -> Self {
        Self::Identity(IdentityParams { address, chain })
    }

    /// Builds a payment predicate.
    #[must_use]
    pub const fn payment(
        price: U256,
        commitment: B256,
        chain: String,
        settlement_address: Address,
    ) -> Self {
        Self::Payment(PaymentParams {
            price,
            commitment,
            chain,
            settlement_address,
        })
    }

    /// Variant identifier used in descriptors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Identity(_) => "identity",
            Self::Payment(_) => "payment",
        }
    }

    /// Produces the verifier program for this predicate.
    ///
    /// Pure in the predicate parameters: identical parameters yield an
    /// identical program.
    #[must_use]
    pub fn verifier_program(&self) -> VerifierProgram {
        match self {
            Self::Identity(_) => VerifierProgram::new(
                vec!["address".to_string(), "chain".to_string()],
                vec![
                    Step::RequireCaller {
                        address: Expr::param("address"),
                    },
                    Step::Allow,
                ],
            ),
            Self::Payment(_) => VerifierProgram::new(
                vec![
                    "chain".to_string(),
                    "settlement_address".to_string(),
                    "commitment".to_string(),
                    "price".to_string(),
                ],
                vec![
                    Step::Emit {
                        message: "evaluating payment policy".to_string(),
                    },
                    Step::SettlementCheck {
                        address: Expr::param("settlement_address"),
                        commitment: Expr::param("commitment"),
                        minimum: Expr::param("price"),
                    },
                    Step::Allow,
                ],
            ),
        }
    }

    /// Compiles the predicate into program, condition and descriptor.
    ///
    /// Payment predicates publish their program source through the provider
    /// to obtain a stable content-addressed reference; the condition then
    /// names "run this exact program" without embedding it inline. Identity
    /// predicates compile to a plain wallet-ownership condition and need no
    /// publication.
    ///
    /// # Errors
    ///
    /// Returns an error when program publication fails upstream.
    pub async fn compile(
        &self,
        kms: &dyn KeyManagementProvider,
    ) -> VaultResult<CompiledPredicate> {
        let program = self.verifier_program();
        let condition = match self {
            Self::Identity(params) => AccessCondition::WalletOwnership {
                address: params.address,
                chain: params.chain.clone(),
            },
            Self::Payment(params) => {
                let program_ref = kms.upload_action(&program.to_source()?).await?;
                let mut bound = Map::new();
                bound.insert("chain".to_string(), Value::String(params.chain.clone()));
                bound.insert(
                    "settlement_address".to_string(),
                    Value::String(params.settlement_address.to_string()),
                );
                bound.insert(
                    "commitment".to_string(),
                    Value::String(params.commitment.to_string()),
                );
                bound.insert("price".to_string(), Value::String(params.price.to_string()));
                AccessCondition::ProgramApproval {
                    program_ref,
                    entry: DEFAULT_ENTRY.to_string(),
                    params: bound,
                    expected: "true".to_string(),
                }
            }
        };

        let descriptor = self.descriptor(&condition);
        Ok(CompiledPredicate {
            program,
            condition,
            descriptor,
        })
    }

    fn descriptor(&self, condition: &AccessCondition) -> PredicateDescriptor {
        match self {
            Self::Identity(params) => {
                let mut audit = Map::new();
                audit.insert(
                    "address".to_string(),
                    Value::String(params.address.to_string()),
                );
                PredicateDescriptor {
                    kind: self.kind().to_string(),
                    description: Some("Caller must match the specified wallet.".to_string()),
                    condition: Some(condition.clone()),
                    params: Some(audit),
                }
            }
            Self::Payment(params) => {
                let mut audit = Map::new();
                audit.insert("price".to_string(), Value::String(params.price.to_string()));
                audit.insert("token".to_string(), Value::String("USDC".to_string()));
                PredicateDescriptor {
                    kind: self.kind().to_string(),
                    description: Some("x402: Payment Required".to_string()),
                    condition: Some(condition.clone()),
                    params: Some(audit),
                }
            }
        }
    }
}

/// Computes the commitment binding `(vault_id, tag, price)`.
///
/// The settlement ledger records payments against this value, so a payment
/// for one file at one price can never satisfy another file's policy.
#[must_use]
pub fn compute_tag_commitment(vault_id: B256, tag: &str, price: U256) -> B256 {
    let mut buf = Vec::with_capacity(96);
    buf.extend_from_slice(vault_id.as_slice());
    buf.extend_from_slice(keccak256(tag.as_bytes()).as_slice());
    buf.extend_from_slice(&price.to_be_bytes::<32>());
    keccak256(&buf)
}
