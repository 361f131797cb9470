//! In-process policy-evaluation sandbox.
//!
//! Stands in for a remote custodian network during development and testing:
//! wrapped keys live in an in-memory table keyed by content hash, verifier
//! programs run under an explicit interpreter with a per-call capability
//! bundle, and every failure is normalized into a [`DecryptOutcome`] value.
//! Nothing in this module panics on program input.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::crypto::{content_hash_hex, open_combined, seal_combined, EphemeralKey};
use crate::error::{VaultError, VaultResult};
use crate::predicate::AccessCondition;
use crate::rpc::RpcClient;
use crate::types::WrappedKey;
use crate::verifier::VerifierProgram;

use super::{DecryptOutcome, DecryptRequest, KeyManagementProvider, VerifierRef};

mod host;
mod interpreter;

use host::{CallerIdentity, ChainAccess, KeyGate, LogSink, ResponseSink, Verdict};
use interpreter::HostSurface;

/// Sandbox configuration.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfig {
    /// JSON-RPC endpoint for real chain probes. When absent, chain checks
    /// auto-approve with a log line.
    pub rpc_url: Option<String>,
    /// When set, all chain checks auto-approve regardless of endpoint.
    pub trusted_mode: bool,
}

struct KeyRecord {
    key: EphemeralKey,
    condition: AccessCondition,
}

/// Local key-management provider evaluating policies in-process.
pub struct SandboxExecutor {
    config: SandboxConfig,
    rpc: Option<RpcClient>,
    connected: AtomicBool,
    keys: Mutex<HashMap<String, KeyRecord>>,
    actions: Mutex<HashMap<String, String>>,
}

impl SandboxExecutor {
    /// Builds a sandbox from its configuration.
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        let rpc = config.rpc_url.as_deref().map(RpcClient::new);
        Self {
            config,
            rpc,
            connected: AtomicBool::new(false),
            keys: Mutex::new(HashMap::new()),
            actions: Mutex::new(HashMap::new()),
        }
    }

    fn require_connected(&self) -> VaultResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VaultError::Configuration(
                "sandbox is not connected".to_string(),
            ))
        }
    }

    async fn resolve_program(
        &self,
        verifier: Option<&VerifierRef>,
    ) -> VaultResult<Option<VerifierProgram>> {
        match verifier {
            None => Ok(None),
            Some(VerifierRef::Inline { source }) => {
                Ok(Some(VerifierProgram::from_source(source)?))
            }
            Some(VerifierRef::Reference { reference }) => {
                let actions = self.actions.lock().await;
                let source = actions.get(reference).ok_or_else(|| {
                    VaultError::SandboxExecution(format!(
                        "unresolvable action reference: {reference}"
                    ))
                })?;
                Ok(Some(VerifierProgram::from_source(source)?))
            }
        }
    }

    /// Evaluates one decrypt request. All fallible paths surface as `Err`;
    /// the public `decrypt` normalizes them into the outcome.
    async fn evaluate(
        &self,
        request: &DecryptRequest,
        logs: &mut Vec<String>,
    ) -> VaultResult<DecryptOutcome> {
        self.require_connected()?;

        let keys = self.keys.lock().await;
        let record = keys.get(&request.content_hash).ok_or_else(|| {
            VaultError::SandboxExecution(format!(
                "unknown content hash: {}",
                request.content_hash
            ))
        })?;

        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(&request.ciphertext)
            .map_err(|err| {
                VaultError::SandboxExecution(format!("malformed wrapped-key ciphertext: {err}"))
            })?;

        let program = self.resolve_program(request.verifier.as_ref()).await?;

        let Some(program) = program else {
            // No gating program supplied. The key table is the only gate;
            // the stored condition is surfaced in the log for audit.
            logs.push(format!(
                "no verifier program supplied; releasing key wrapped under {} condition",
                condition_kind(&record.condition)
            ));
            let released = open_combined(&record.key, &ciphertext)?;
            return Ok(DecryptOutcome::approved(released, std::mem::take(logs)));
        };

        let mut surface = HostSurface {
            caller: CallerIdentity {
                address: request.auth_context.address,
            },
            chain: ChainAccess::new(self.config.trusted_mode, self.rpc.as_ref()),
            key_gate: KeyGate::new(&request.content_hash, &record.key, &ciphertext),
            response: ResponseSink::default(),
            logs: LogSink::default(),
        };

        let run = interpreter::execute(&program, &request.params, &mut surface).await;
        let HostSurface { response, logs: sink, .. } = surface;
        logs.extend(sink.into_lines());
        run?;

        let (verdict, payload) = response.into_parts();
        match verdict {
            Some(Verdict::Denied { reason }) => {
                Ok(DecryptOutcome::denied(reason, std::mem::take(logs)))
            }
            Some(Verdict::Allowed) => {
                let released = match payload {
                    Some(bytes) => bytes,
                    None => open_combined(&record.key, &ciphertext)?,
                };
                Ok(DecryptOutcome::approved(released, std::mem::take(logs)))
            }
            // Programs that end without a verdict fail closed.
            None => Ok(DecryptOutcome::denied(
                "program rendered no verdict",
                std::mem::take(logs),
            )),
        }
    }
}

const fn condition_kind(condition: &AccessCondition) -> &'static str {
    match condition {
        AccessCondition::WalletOwnership { .. } => "wallet-ownership",
        AccessCondition::ProgramApproval { .. } => "program-approval",
    }
}

#[async_trait]
impl KeyManagementProvider for SandboxExecutor {
    async fn connect(&self) -> VaultResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> VaultResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.keys.lock().await.clear();
        self.actions.lock().await.clear();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn encrypt(
        &self,
        key_material: &[u8],
        condition: &AccessCondition,
    ) -> VaultResult<WrappedKey> {
        self.require_connected()?;

        let content_hash = content_hash_hex(key_material);
        let wrapping_key = EphemeralKey::generate();
        let blob = seal_combined(&wrapping_key, key_material)?;
        let ciphertext = base64::engine::general_purpose::STANDARD.encode(blob);

        self.keys.lock().await.insert(
            content_hash.clone(),
            KeyRecord {
                key: wrapping_key,
                condition: condition.clone(),
            },
        );

        Ok(WrappedKey {
            ciphertext,
            content_hash,
        })
    }

    async fn decrypt(&self, request: DecryptRequest) -> DecryptOutcome {
        let mut logs = Vec::new();
        match self.evaluate(&request, &mut logs).await {
            Ok(outcome) => outcome,
            Err(err) => DecryptOutcome::denied(err.to_string(), logs),
        }
    }

    async fn upload_action(&self, source: &str) -> VaultResult<String> {
        self.require_connected()?;

        // Content-addressed: identical source always yields the same
        // reference, shaped like an IPFS CID for interface parity.
        let digest = hex::encode(Sha256::digest(source.as_bytes()));
        let reference = format!("Qm{}", &digest[..44]);
        self.actions
            .lock()
            .await
            .insert(reference.clone(), source.to_string());
        Ok(reference)
    }
}
