// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Boundary validation.
//!
//! Addresses are `0x` + 40 hex chars, signatures `0x` + 130 hex chars,
//! outcomes the strings `"0"` and `"1"`, nonces and amounts decimal
//! strings of arbitrary precision. Identifiers always leave the API
//! lower-case.

use ethers::types::{Address, Signature, H256, U256};

use crate::error::ApiError;

fn is_hex_of_len(raw: &str, hex_len: usize) -> bool {
    raw.len() == 2 + hex_len
        && raw.starts_with("0x")
        && raw[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Parses a `0x`-prefixed 20-byte address, case-insensitively.
pub fn parse_address(raw: &str) -> Result<Address, ApiError> {
    if !is_hex_of_len(raw, 40) {
        return Err(ApiError::validation(format!(
            "'{raw}' is not a valid address (expected 0x + 40 hex chars)"
        )));
    }
    raw.parse().map_err(|_| {
        ApiError::validation(format!("'{raw}' is not a valid address"))
    })
}

/// Parses a `0x`-prefixed 65-byte signature.
pub fn parse_signature(raw: &str) -> Result<Signature, ApiError> {
    if !is_hex_of_len(raw, 130) {
        return Err(ApiError::validation(format!(
            "signature must be 0x + 130 hex chars, got {} chars",
            raw.len()
        )));
    }
    raw.parse().map_err(|_| {
        ApiError::validation("signature bytes are malformed".to_string())
    })
}

/// Parses the outcome strings `"0"` and `"1"`.
pub fn parse_outcome(raw: &str) -> Result<u8, ApiError> {
    match raw {
        "0" => Ok(0),
        "1" => Ok(1),
        other => Err(ApiError::validation(format!(
            "outcome must be \"0\" or \"1\", got \"{other}\""
        ))),
    }
}

/// Parses a non-negative decimal string of arbitrary precision.
pub fn parse_uint(raw: &str, what: &str) -> Result<U256, ApiError> {
    U256::from_dec_str(raw).map_err(|_| {
        ApiError::validation(format!(
            "{what} must be a non-negative decimal string, got \"{raw}\""
        ))
    })
}

/// Parses an optional `0x`-prefixed 32-byte salt; absent means zero.
pub fn parse_salt(raw: Option<&str>) -> Result<H256, ApiError> {
    match raw {
        None => Ok(H256::zero()),
        Some(raw) => {
            if !is_hex_of_len(raw, 64) {
                return Err(ApiError::validation(
                    "salt must be 0x + 64 hex chars".to_string(),
                ));
            }
            raw.parse().map_err(|_| {
                ApiError::validation("salt is malformed".to_string())
            })
        }
    }
}

/// Validates the market threshold bounds (51..=99 percent).
pub fn parse_threshold(threshold: u8) -> Result<u8, ApiError> {
    if !(51..=99).contains(&threshold) {
        return Err(ApiError::validation(format!(
            "thresholdPercent must be between 51 and 99, got {threshold}"
        )));
    }
    Ok(threshold)
}

/// Clamp-checks a market list page size into 1..=100.
pub fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(50);
    if !(1..=100).contains(&limit) {
        return Err(ApiError::validation(format!(
            "limit must be between 1 and 100, got {limit}"
        )));
    }
    Ok(limit)
}

/// Checks a non-negative offset.
pub fn parse_offset(offset: Option<i64>) -> Result<i64, ApiError> {
    let offset = offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::validation(format!(
            "offset must be non-negative, got {offset}"
        )));
    }
    Ok(offset)
}

/// Checks a market status filter (0..=4).
pub fn parse_status(status: Option<i64>) -> Result<Option<i64>, ApiError> {
    match status {
        None => Ok(None),
        Some(status) if (0..=4).contains(&status) => Ok(Some(status)),
        Some(other) => Err(ApiError::validation(format!(
            "status must be between 0 and 4, got {other}"
        ))),
    }
}
