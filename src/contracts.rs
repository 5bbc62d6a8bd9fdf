use std::str::FromStr;

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, U256};
use ethers::utils::{keccak256, parse_units};

use crate::error::{AppError, AppResult, ContractError, RpcError};

/// `Error(string)` selector prepended to Solidity revert payloads.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// First four bytes of the keccak of a canonical function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// ABI-encode a call as 0x-prefixed hex calldata.
pub fn encode_call(signature: &str, args: &[Token]) -> String {
    let mut data = selector(signature).to_vec();
    data.extend(abi::encode(args));
    format!("0x{}", hex::encode(data))
}

/// Decode `eth_call` return data against the expected output types.
pub fn decode_outputs(types: &[ParamType], hex_data: &str) -> AppResult<Vec<Token>> {
    let bytes = hex::decode(hex_data.trim_start_matches("0x"))
        .map_err(|e| ContractError::Decode(e.to_string()))?;
    abi::decode(types, &bytes)
        .map_err(|e| ContractError::Decode(e.to_string()).into())
}

/// Decode a single uint256 return value.
pub fn decode_uint(hex_data: &str) -> AppResult<U256> {
    let tokens = decode_outputs(&[ParamType::Uint(256)], hex_data)?;
    match tokens.first() {
        Some(Token::Uint(value)) => Ok(*value),
        _ => Err(ContractError::Decode("expected uint256".into()).into()),
    }
}

/// Validate and parse a 20-byte hex address.
pub fn parse_address(address: &str) -> AppResult<Address> {
    Address::from_str(address).map_err(|_| AppError::InvalidAddress(address.to_string()))
}

pub fn is_valid_address(address: &str) -> bool {
    Address::from_str(address).is_ok()
}

/// Scale a decimal-string amount into base units for the given decimals.
pub fn scale_amount(amount: &str, decimals: u32) -> AppResult<U256> {
    let parsed = parse_units(amount, decimals)
        .map_err(|e| AppError::InvalidInput(format!("amount {amount:?}: {e}")))?;
    Ok(parsed.into())
}

pub fn u256_to_hex(value: U256) -> String {
    format!("{value:#x}")
}

pub fn u256_from_hex(hex: &str) -> AppResult<U256> {
    U256::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::MalformedResponse(format!("bad hex quantity {hex:?}: {e}")).into())
}

/// Pull the human-readable revert reason out of a provider error, if the
/// error data carries an `Error(string)` payload. Falls back to the provider
/// message otherwise.
pub fn revert_reason(error: &RpcError) -> Option<String> {
    let RpcError::Provider { message, data, .. } = error else {
        return None;
    };

    if let Some(reason) = data
        .as_ref()
        .and_then(find_revert_hex)
        .and_then(|hex| decode_error_string(&hex))
    {
        return Some(reason);
    }

    // Nodes commonly embed `execution reverted: <reason>` in the message.
    message
        .split_once("reverted:")
        .map(|(_, reason)| reason.trim().to_string())
        .or_else(|| Some(message.clone()))
}

fn find_revert_hex(data: &serde_json::Value) -> Option<String> {
    match data {
        serde_json::Value::String(s) if s.starts_with("0x") => Some(s.clone()),
        serde_json::Value::Object(map) => map.values().find_map(find_revert_hex),
        _ => None,
    }
}

fn decode_error_string(hex_data: &str) -> Option<String> {
    let bytes = hex::decode(hex_data.trim_start_matches("0x")).ok()?;
    if bytes.len() < 4 || bytes[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    let tokens = abi::decode(&[ParamType::String], &bytes[4..]).ok()?;
    match tokens.into_iter().next() {
        Some(Token::String(reason)) => Some(reason),
        _ => None,
    }
}
