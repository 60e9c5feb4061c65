//! Per-network key and address derivation
//!
//! Converts a public key obtained from the device into the network's
//! address format, and validates user-entered addresses for read-only
//! flows. Cosmos-family chains share one derivation with different
//! bech32 prefixes; Celo uses Ethereum-style hex addresses.

use bech32::{self, FromBase32, ToBase32, Variant};
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

use crate::error::{AnthemError, AnthemResult};
use crate::types::Network;

/// Address and public key derived from a connected device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedAddress {
    pub network: Network,
    pub address: String,
    /// Compressed public key, hex
    pub public_key_hex: String,
}

/// Derive a network address from a device public key.
///
/// Hardware derivation is only implemented for Cosmos-family networks and
/// Celo. Oasis and Polkadot fail cleanly before any device interaction so
/// read-only flows remain the only path for those networks.
pub fn derive_address(network: Network, public_key: &[u8]) -> AnthemResult<DerivedAddress> {
    let address = match network {
        Network::Cosmos | Network::Terra | Network::Kava => {
            let prefix = network
                .account_prefix()
                .expect("cosmos-family networks have a bech32 prefix");
            encode_bech32_account(public_key, prefix)?
        }
        Network::Celo => encode_celo_address(public_key)?,
        Network::Oasis => {
            return Err(AnthemError::operation_not_supported(
                "Ledger derivation is not available for Oasis; use address entry",
            ));
        }
        Network::Polkadot => {
            return Err(AnthemError::operation_not_supported(
                "Ledger derivation is not available for Polkadot; use address entry",
            ));
        }
    };

    Ok(DerivedAddress {
        network,
        address,
        public_key_hex: hex::encode(public_key),
    })
}

/// Encode a Cosmos-family account address: sha256 then ripemd160 of the
/// compressed public key, bech32 with the network prefix.
pub fn encode_bech32_account(public_key: &[u8], prefix: &str) -> AnthemResult<String> {
    if public_key.len() != 33 {
        return Err(AnthemError::invalid_input(format!(
            "Expected 33-byte compressed public key, got {} bytes",
            public_key.len()
        )));
    }

    let sha = Sha256::digest(public_key);
    let ripe = Ripemd160::digest(sha);

    let address = bech32::encode(prefix, ripe.to_base32(), Variant::Bech32)?;
    Ok(address)
}

/// Encode a Celo (Ethereum-style) address: keccak256 of the uncompressed
/// public key body, last 20 bytes, EIP-55 checksum casing.
pub fn encode_celo_address(public_key: &[u8]) -> AnthemResult<String> {
    // Accept the 65-byte SEC1 uncompressed form or the bare 64-byte body
    let body = match public_key.len() {
        65 if public_key[0] == 0x04 => &public_key[1..],
        64 => public_key,
        n => {
            return Err(AnthemError::invalid_input(format!(
                "Expected uncompressed public key (64/65 bytes), got {} bytes",
                n
            )));
        }
    };

    let mut hasher = Keccak::v256();
    hasher.update(body);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);

    Ok(to_checksum_address(&hash[12..]))
}

/// EIP-55 mixed-case checksum encoding of a 20-byte address
pub fn to_checksum_address(bytes: &[u8]) -> String {
    let lower = hex::encode(bytes);

    let mut hasher = Keccak::v256();
    hasher.update(lower.as_bytes());
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, ch) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if ch.is_ascii_digit() || nibble < 8 {
            out.push(ch);
        } else {
            out.push(ch.to_ascii_uppercase());
        }
    }
    out
}

/// Re-encode a Cosmos-family account address as its validator-operator
/// form (same payload, valoper prefix).
pub fn to_validator_address(address: &str, network: Network) -> AnthemResult<String> {
    let account_prefix = network.account_prefix().ok_or_else(|| {
        AnthemError::operation_not_supported(format!(
            "{} does not use bech32 validator addresses",
            network.name()
        ))
    })?;
    let validator_prefix = network.validator_prefix().ok_or_else(|| {
        AnthemError::operation_not_supported(format!(
            "{} does not use bech32 validator addresses",
            network.name()
        ))
    })?;

    let (hrp, data, variant) = bech32::decode(address)?;
    if hrp != account_prefix {
        return Err(AnthemError::invalid_address(format!(
            "Expected a {} address, got prefix '{}'",
            account_prefix, hrp
        )));
    }

    let payload = Vec::<u8>::from_base32(&data)?;
    let converted = bech32::encode(validator_prefix, payload.to_base32(), variant)?;
    Ok(converted)
}

/// Re-encode a validator-operator address as its account form
pub fn to_account_address(address: &str, network: Network) -> AnthemResult<String> {
    let account_prefix = network.account_prefix().ok_or_else(|| {
        AnthemError::operation_not_supported(format!(
            "{} does not use bech32 addresses",
            network.name()
        ))
    })?;
    let validator_prefix = network.validator_prefix().ok_or_else(|| {
        AnthemError::operation_not_supported(format!(
            "{} does not use bech32 validator addresses",
            network.name()
        ))
    })?;

    let (hrp, data, variant) = bech32::decode(address)?;
    if hrp != validator_prefix {
        return Err(AnthemError::invalid_address(format!(
            "Expected a {} address, got prefix '{}'",
            validator_prefix, hrp
        )));
    }

    let payload = Vec::<u8>::from_base32(&data)?;
    let converted = bech32::encode(account_prefix, payload.to_base32(), variant)?;
    Ok(converted)
}

/// Validate a user-entered address for read-only dashboards. Accepts
/// account or validator-operator forms for bech32 networks. This path
/// intentionally covers Oasis and Polkadot even though their hardware
/// derivation is unsupported.
pub fn validate_address(address: &str, network: Network) -> AnthemResult<()> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(AnthemError::invalid_address("Address is empty"));
    }

    match network {
        Network::Cosmos | Network::Terra | Network::Kava | Network::Oasis => {
            let (hrp, data, _) = bech32::decode(trimmed)?;
            Vec::<u8>::from_base32(&data)?;

            let account = network.account_prefix().unwrap_or_default();
            let validator = network.validator_prefix();
            if hrp != account && validator != Some(hrp.as_str()) {
                return Err(AnthemError::invalid_address(format!(
                    "Address prefix '{}' does not belong to {}",
                    hrp,
                    network.name()
                )));
            }
            Ok(())
        }
        Network::Celo => {
            let hex_part = trimmed
                .strip_prefix("0x")
                .ok_or_else(|| AnthemError::invalid_address("Celo address must start with 0x"))?;
            if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(AnthemError::invalid_address(
                    "Celo address must be 20 bytes of hex",
                ));
            }
            Ok(())
        }
        Network::Polkadot => {
            // SS58 shape check: base58 alphabet, plausible length
            const BASE58: &str =
                "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
            if trimmed.len() < 46
                || trimmed.len() > 50
                || !trimmed.chars().all(|c| BASE58.contains(c))
            {
                return Err(AnthemError::invalid_address(
                    "Not a valid Polkadot SS58 address",
                ));
            }
            Ok(())
        }
    }
}
