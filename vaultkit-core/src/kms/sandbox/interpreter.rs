//! Straight-line interpreter for verifier programs.

use alloy_primitives::{keccak256, Address, B256, U256};
use serde_json::{Map, Value};

use crate::error::{VaultError, VaultResult};
use crate::verifier::{Expr, Step, VerifierProgram};

use super::host::{CallOutcome, CallerIdentity, ChainAccess, KeyGate, LogSink, ResponseSink, Verdict};

/// Upper bound on executed steps per invocation.
pub(crate) const MAX_STEPS: usize = 256;

/// The complete capability bundle for one invocation.
pub(crate) struct HostSurface<'a> {
    pub(crate) caller: CallerIdentity,
    pub(crate) chain: ChainAccess<'a>,
    pub(crate) key_gate: KeyGate<'a>,
    pub(crate) response: ResponseSink,
    pub(crate) logs: LogSink,
}

/// Runs `program` against the host surface.
///
/// Policy outcomes (allow/deny) land in the response sink. An `Err` here
/// means the program could not be evaluated at all: unbound parameter,
/// malformed operand, budget exhaustion, chain transport failure or a
/// foreign content-hash request.
pub(crate) async fn execute(
    program: &VerifierProgram,
    params: &Map<String, Value>,
    host: &mut HostSurface<'_>,
) -> VaultResult<()> {
    if program.steps.len() > MAX_STEPS {
        return Err(VaultError::SandboxExecution(format!(
            "program exceeds the {MAX_STEPS}-step budget"
        )));
    }

    for step in &program.steps {
        match step {
            Step::Emit { message } => host.logs.push(message.clone()),
            Step::RequireCaller { address } => {
                let expected = eval_address(address, params, host.caller)?;
                if expected != host.caller.address {
                    host.response.set_verdict(Verdict::Denied {
                        reason: format!(
                            "caller {} does not match required address {expected}",
                            host.caller.address
                        ),
                    });
                    return Ok(());
                }
            }
            Step::ContractCheck {
                address,
                method,
                args,
            } => {
                let to = eval_address(address, params, host.caller)?;
                let mut calldata = selector(method).to_vec();
                for arg in args {
                    let value = eval(arg, params, host.caller)?;
                    calldata.extend_from_slice(&encode_arg_word(&value)?);
                }
                match host.chain.eth_call(to, calldata, &mut host.logs).await? {
                    CallOutcome::Approved => {}
                    CallOutcome::Raw(data) => {
                        if data.last() != Some(&1) {
                            host.response.set_verdict(Verdict::Denied {
                                reason: format!("contract check {method} returned false"),
                            });
                            return Ok(());
                        }
                    }
                }
            }
            Step::SettlementCheck {
                address,
                commitment,
                minimum,
            } => {
                let to = eval_address(address, params, host.caller)?;
                let commitment = eval_b256(commitment, params, host.caller)?;
                let minimum = eval_u256(minimum, params, host.caller)?;

                let mut calldata = selector("checkSettlement(bytes32,address)").to_vec();
                calldata.extend_from_slice(commitment.as_slice());
                calldata.extend_from_slice(&[0u8; 12]);
                calldata.extend_from_slice(host.caller.address.as_slice());

                match host.chain.eth_call(to, calldata, &mut host.logs).await? {
                    CallOutcome::Approved => {}
                    CallOutcome::Raw(data) => {
                        let paid = settled_amount(&data)?;
                        host.logs.push(format!(
                            "settlement check: paid {paid}, required {minimum}"
                        ));
                        if paid < minimum {
                            host.response.set_verdict(Verdict::Denied {
                                reason: format!(
                                    "insufficient settlement: paid {paid}, required {minimum}"
                                ),
                            });
                            return Ok(());
                        }
                    }
                }
            }
            Step::RecombineKey { content_hash } => {
                let requested = eval_string(content_hash, params, host.caller)?;
                let released = host.key_gate.recombine(&requested)?;
                host.response.set_payload(released);
            }
            Step::Allow => {
                host.response.set_verdict(Verdict::Allowed);
                return Ok(());
            }
            Step::Deny { reason } => {
                host.response.set_verdict(Verdict::Denied {
                    reason: reason.clone(),
                });
                return Ok(());
            }
        }
    }

    Ok(())
}

fn selector(method: &str) -> [u8; 4] {
    let digest = keccak256(method.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn eval(expr: &Expr, params: &Map<String, Value>, caller: CallerIdentity) -> VaultResult<Value> {
    match expr {
        Expr::Lit { value } => Ok(value.clone()),
        Expr::Param { name } => params.get(name).cloned().ok_or_else(|| {
            VaultError::SandboxExecution(format!("unbound parameter: {name}"))
        }),
        Expr::CallerAddress => Ok(Value::String(caller.address.to_string())),
    }
}

fn eval_string(
    expr: &Expr,
    params: &Map<String, Value>,
    caller: CallerIdentity,
) -> VaultResult<String> {
    match eval(expr, params, caller)? {
        Value::String(text) => Ok(text),
        other => Err(VaultError::SandboxExecution(format!(
            "expected a string operand, got {other}"
        ))),
    }
}

fn eval_address(
    expr: &Expr,
    params: &Map<String, Value>,
    caller: CallerIdentity,
) -> VaultResult<Address> {
    let text = eval_string(expr, params, caller)?;
    text.parse()
        .map_err(|_| VaultError::SandboxExecution(format!("invalid address operand: {text}")))
}

fn eval_b256(
    expr: &Expr,
    params: &Map<String, Value>,
    caller: CallerIdentity,
) -> VaultResult<B256> {
    let text = eval_string(expr, params, caller)?;
    text.parse()
        .map_err(|_| VaultError::SandboxExecution(format!("invalid 32-byte operand: {text}")))
}

fn eval_u256(
    expr: &Expr,
    params: &Map<String, Value>,
    caller: CallerIdentity,
) -> VaultResult<U256> {
    match eval(expr, params, caller)? {
        Value::String(text) => parse_u256(&text),
        Value::Number(number) => number
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| {
                VaultError::SandboxExecution(format!("invalid numeric operand: {number}"))
            }),
        other => Err(VaultError::SandboxExecution(format!(
            "expected a numeric operand, got {other}"
        ))),
    }
}

fn parse_u256(text: &str) -> VaultResult<U256> {
    let parsed = text.strip_prefix("0x").map_or_else(
        || U256::from_str_radix(text, 10),
        |hex_digits| U256::from_str_radix(hex_digits, 16),
    );
    parsed.map_err(|_| VaultError::SandboxExecution(format!("invalid amount operand: {text}")))
}

/// Encodes one argument as a 32-byte ABI word.
fn encode_arg_word(value: &Value) -> VaultResult<[u8; 32]> {
    let mut word = [0u8; 32];
    match value {
        Value::String(text) if text.starts_with("0x") && text.len() == 42 => {
            let address: Address = text.parse().map_err(|_| {
                VaultError::SandboxExecution(format!("invalid address argument: {text}"))
            })?;
            word[12..].copy_from_slice(address.as_slice());
        }
        Value::String(text) if text.starts_with("0x") && text.len() == 66 => {
            let bytes: B256 = text.parse().map_err(|_| {
                VaultError::SandboxExecution(format!("invalid 32-byte argument: {text}"))
            })?;
            word.copy_from_slice(bytes.as_slice());
        }
        Value::String(text) => {
            word = parse_u256(text)?.to_be_bytes::<32>();
        }
        Value::Number(number) => {
            let amount = number.as_u64().ok_or_else(|| {
                VaultError::SandboxExecution(format!("invalid numeric argument: {number}"))
            })?;
            word = U256::from(amount).to_be_bytes::<32>();
        }
        other => {
            return Err(VaultError::SandboxExecution(format!(
                "unsupported argument type: {other}"
            )))
        }
    }
    Ok(word)
}

/// Interprets raw return data as a settled amount: the last 32 bytes as a
/// big-endian unsigned integer.
fn settled_amount(data: &[u8]) -> VaultResult<U256> {
    if data.len() < 32 {
        return Err(VaultError::SandboxExecution(
            "settlement read returned fewer than 32 bytes".to_string(),
        ));
    }
    let tail: [u8; 32] = data[data.len() - 32..]
        .try_into()
        .map_err(|_| VaultError::SandboxExecution("settlement read malformed".to_string()))?;
    Ok(U256::from_be_bytes(tail))
}
