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

//! The attestation typed-data domain.
//!
//! The signing domain is `{name: "Sidebet", version: "1", chainId,
//! verifyingContract: <market>}` and the primary type is
//! `Attestation(address market, uint256 outcome, uint256 nonce)`. The
//! digest below is what wallets sign through `eth_signTypedData_v4`, so
//! it must match the market contract byte for byte.

use ethers::abi::Token;
use ethers::types::transaction::eip712::EIP712Domain;
use ethers::types::{Address, Signature, H256, U256};
use ethers::utils::keccak256;

/// `keccak256("Attestation(address market,uint256 outcome,uint256 nonce)")`
fn attestation_typehash() -> H256 {
    H256(keccak256(
        "Attestation(address market,uint256 outcome,uint256 nonce)",
    ))
}

/// The EIP-712 digest of an attestation over (market, outcome, nonce).
pub fn attestation_digest(
    chain_id: u64,
    market: Address,
    outcome: U256,
    nonce: U256,
) -> H256 {
    let domain = EIP712Domain {
        name: Some("Sidebet".to_string()),
        version: Some("1".to_string()),
        chain_id: Some(chain_id.into()),
        verifying_contract: Some(market),
        salt: None,
    };
    let domain_separator = domain.separator();
    let struct_hash = keccak256(ethers::abi::encode(&[
        Token::FixedBytes(attestation_typehash().as_bytes().to_vec()),
        Token::Address(market),
        Token::Uint(outcome),
        Token::Uint(nonce),
    ]));
    let mut digest_input = Vec::with_capacity(2 + 32 + 32);
    digest_input.extend_from_slice(&[0x19, 0x01]);
    digest_input.extend_from_slice(&domain_separator);
    digest_input.extend_from_slice(&struct_hash);
    H256(keccak256(digest_input))
}

/// Recovers the signer of an attestation signature, comparing
/// case-insensitively against `claimed_signer`. Any recovery failure is
/// treated as an invalid signature.
pub fn verify_attestation_signature(
    signature: &Signature,
    claimed_signer: Address,
    chain_id: u64,
    market: Address,
    outcome: U256,
    nonce: U256,
) -> bool {
    let digest = attestation_digest(chain_id, market, outcome, nonce);
    match signature.recover(digest) {
        Ok(recovered) => recovered == claimed_signer,
        Err(e) => {
            tracing::trace!("attestation signature recovery failed: {e}");
            false
        }
    }
}
