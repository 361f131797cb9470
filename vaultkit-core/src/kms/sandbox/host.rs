//! Host capabilities handed to one verifier invocation.
//!
//! Each capability is scoped to the single call being evaluated: the key
//! gate is bound to one content hash, the response sink records one verdict,
//! and chain access only performs read-only probes. A program cannot reach
//! anything the bundle does not contain.

use alloy_primitives::Address;

use crate::crypto::{open_combined, EphemeralKey};
use crate::error::{VaultError, VaultResult};
use crate::rpc::RpcClient;

/// The caller identity asserted for this invocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallerIdentity {
    pub(crate) address: Address,
}

/// Execution log collector.
#[derive(Debug, Default)]
pub(crate) struct LogSink {
    lines: Vec<String>,
}

impl LogSink {
    pub(crate) fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub(crate) fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Result of a read-only chain probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallOutcome {
    /// The probe was skipped and treated as passing (trusted mode, or no
    /// endpoint configured).
    Approved,
    /// Raw return data from the node.
    Raw(Vec<u8>),
}

/// Read-only chain access, or a stand-in when no endpoint is configured.
pub(crate) struct ChainAccess<'a> {
    trusted: bool,
    rpc: Option<&'a RpcClient>,
}

impl<'a> ChainAccess<'a> {
    pub(crate) const fn new(trusted: bool, rpc: Option<&'a RpcClient>) -> Self {
        Self { trusted, rpc }
    }

    /// Probes a contract. Trusted mode and endpoint-less configurations
    /// auto-approve and say so in the log.
    pub(crate) async fn eth_call(
        &self,
        to: Address,
        calldata: Vec<u8>,
        logs: &mut LogSink,
    ) -> VaultResult<CallOutcome> {
        if self.trusted {
            logs.push(format!("trusted mode: auto-approving chain check on {to}"));
            return Ok(CallOutcome::Approved);
        }
        match self.rpc {
            Some(rpc) => Ok(CallOutcome::Raw(rpc.eth_call(to, &calldata).await?)),
            None => {
                logs.push(format!(
                    "no rpc endpoint configured: approving chain check on {to}"
                ));
                Ok(CallOutcome::Approved)
            }
        }
    }
}

/// Key-release capability bound to exactly one content hash.
pub(crate) struct KeyGate<'a> {
    bound_hash: &'a str,
    key: &'a EphemeralKey,
    ciphertext: &'a [u8],
}

impl<'a> KeyGate<'a> {
    pub(crate) const fn new(
        bound_hash: &'a str,
        key: &'a EphemeralKey,
        ciphertext: &'a [u8],
    ) -> Self {
        Self {
            bound_hash,
            key,
            ciphertext,
        }
    }

    /// Recombines the protected value, provided the program asks for the
    /// hash this invocation is bound to.
    pub(crate) fn recombine(&self, requested: &str) -> VaultResult<Vec<u8>> {
        if requested != self.bound_hash {
            return Err(VaultError::SandboxExecution(format!(
                "program requested content hash {requested} but this invocation is bound to {}",
                self.bound_hash
            )));
        }
        open_combined(self.key, self.ciphertext)
    }
}

/// The single verdict a program may render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Policy approved the caller.
    Allowed,
    /// Policy rejected the caller.
    Denied {
        /// Reason surfaced to the caller.
        reason: String,
    },
}

/// Collects the program's verdict and any recombined payload.
#[derive(Debug, Default)]
pub(crate) struct ResponseSink {
    verdict: Option<Verdict>,
    payload: Option<Vec<u8>>,
}

impl ResponseSink {
    /// Records the verdict. First write wins; programs are straight-line so
    /// a second write indicates an interpreter bug, not program input.
    pub(crate) fn set_verdict(&mut self, verdict: Verdict) {
        if self.verdict.is_none() {
            self.verdict = Some(verdict);
        }
    }

    pub(crate) fn set_payload(&mut self, payload: Vec<u8>) {
        self.payload = Some(payload);
    }

    pub(crate) fn into_parts(self) -> (Option<Verdict>, Option<Vec<u8>>) {
        (self.verdict, self.payload)
    }
}
