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

use axum::http::StatusCode;

/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the
/// execution of the Sidebet Relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error in the underlying Http server.
    #[error(transparent)]
    Axum(#[from] axum::Error),
    /// HTTP Error
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    /// Database error.
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// ABI encoding/decoding error.
    #[error(transparent)]
    EthersAbi(#[from] ethers::abi::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Malformed input at the API boundary.
    #[error("Validation error: {}", _0)]
    Validation(String),
    /// Unknown market, absent proposal, or any other missing entity.
    #[error("Not found: {}", _0)]
    NotFound(String),
    /// Duplicate attestation or duplicate state transition.
    #[error("Conflict: {}", _0)]
    Conflict(String),
    /// The signature does not recover to the claimed signer.
    #[error("Signature does not recover to the claimed signer")]
    SignatureInvalid,
    /// The signer has no stake in the market.
    #[error("Signer {} is not a participant of market {}", signer, market)]
    NotParticipant {
        /// The market address.
        market: String,
        /// The attesting wallet.
        signer: String,
    },
    /// The attested outcome disagrees with the signer's stake or the
    /// active proposal.
    #[error("Attested outcome {} does not match expected outcome {}", submitted, expected)]
    OutcomeMismatch {
        /// The outcome carried by the attestation.
        submitted: u8,
        /// The outcome the attestation is required to match.
        expected: u8,
    },
    /// The market has no non-disputed proposal to attest to.
    #[error("No active proposal for market {}", _0)]
    NoActiveProposal(String),
    /// Transport or timeout errors talking to the chain.
    #[error("Chain unavailable: {}", _0)]
    ChainUnavailable(String),
    /// A chain call reverted.
    #[error("Contract call failed: {}", _0)]
    ContractCall(String),
    /// Too many requests from one client.
    #[error("Rate limit exceeded, try again later")]
    RateLimitExceeded,
    /// Missing Secrets in the config, the relayer private key.
    #[error("Missing required relayer private key in the config")]
    MissingSecrets,
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
}

/// A type alias for the result for the sidebet relayer, that uses the
/// `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The stable, documented error code for this error kind, carried in
    /// the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::SignatureInvalid => "SIGNATURE_INVALID",
            Error::NotParticipant { .. } => "NOT_PARTICIPANT",
            Error::OutcomeMismatch { .. } => "OUTCOME_MISMATCH",
            Error::NoActiveProposal(_) => "NO_ACTIVE_PROPOSAL",
            Error::ChainUnavailable(_) => "CHAIN_UNAVAILABLE",
            Error::ContractCall(_) => "CHAIN_UNAVAILABLE",
            Error::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            _ => "INTERNAL",
        }
    }

    /// The HTTP status code this error kind maps to on read paths.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_)
            | Error::SignatureInvalid
            | Error::NotParticipant { .. }
            | Error::OutcomeMismatch { .. }
            | Error::NoActiveProposal(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Error::ChainUnavailable(_) | Error::ContractCall(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error should hide its message from API clients.
    pub fn is_internal(&self) -> bool {
        self.code() == "INTERNAL"
    }
}
