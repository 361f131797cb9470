//! Chain presets for supported deployments.

use alloy_primitives::{address, Address};

/// Deployment parameters for one supported chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Chain name used in access conditions.
    pub chain_name: &'static str,
    /// Numeric chain id.
    pub chain_id: u64,
    /// Default public JSON-RPC endpoint.
    pub rpc_url: &'static str,
    /// Vault registry contract.
    pub registry_address: Address,
    /// USDC token used for settlements.
    pub usdc_address: Address,
}

/// Arbitrum Sepolia deployment.
#[must_use]
pub const fn arbitrum_sepolia() -> ChainConfig {
    ChainConfig {
        chain_name: "arbitrumSepolia",
        chain_id: 421_614,
        rpc_url: "https://sepolia-rollup.arbitrum.io/rpc",
        registry_address: address!("4bd96b4d274bdc845dccd06bb886ecdc0d708bdb"),
        usdc_address: address!("75faf114eafb1BDbe2F0316DF893fd58CE46AA4d"),
    }
}

/// Base Sepolia deployment.
#[must_use]
pub const fn base_sepolia() -> ChainConfig {
    ChainConfig {
        chain_name: "baseSepolia",
        chain_id: 84_532,
        rpc_url: "https://sepolia.base.org",
        registry_address: address!("4e7c79e79da6d98e3747b72147c0bfd9330c95a6"),
        usdc_address: address!("036CbD53842c5426634e7929541eC2318f3dCF7e"),
    }
}

/// Looks up a preset by chain name.
#[must_use]
pub fn by_name(chain_name: &str) -> Option<ChainConfig> {
    match chain_name {
        "arbitrumSepolia" => Some(arbitrum_sepolia()),
        "baseSepolia" => Some(base_sepolia()),
        _ => None,
    }
}
