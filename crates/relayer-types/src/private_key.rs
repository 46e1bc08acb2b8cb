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

use std::str::FromStr;

use ethers::types::H256;
use serde::Deserialize;

/// PrivateKey represents the relayer's hot wallet private key.
///
/// The `Debug` implementation never prints the key material.
#[derive(Clone)]
pub struct PrivateKey(H256);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<H256> for PrivateKey {
    fn from(secret: H256) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = H256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = H256;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value.starts_with("0x") {
                    // hex value
                    let maybe_hex = H256::from_str(value);
                    match maybe_hex {
                        Ok(val) => Ok(val),
                        Err(e) => Err(serde::de::Error::custom(format!("{e}\n got {} but expected a 66 chars string (including the 0x prefix)", value.len()))),
                    }
                } else if value.starts_with('$') {
                    // env
                    let var = value.strip_prefix('$').unwrap_or(value);
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {}: {}",
                            var, e,
                        ))
                    })?;
                    let maybe_hex = H256::from_str(&val);
                    match maybe_hex {
                        Ok(val) => Ok(val),
                        Err(e) => Err(serde::de::Error::custom(format!("{e}\n expected a 66 chars string (including the 0x prefix) but found {} chars",  val.len())))
                    }
                } else if value.starts_with("file:") {
                    // Read secrets from the file path
                    let file_path =
                        value.strip_prefix("file:").unwrap_or(value);
                    let val =
                        std::fs::read_to_string(file_path).map_err(|e| {
                            serde::de::Error::custom(format!(
                                "error while reading file path {} : {}",
                                file_path, e
                            ))
                        })?;
                    let maybe_hex = H256::from_str(val.trim());
                    match maybe_hex {
                        Ok(val) => Ok(val),
                        Err(e) => Err(serde::de::Error::custom(format!("{e}\n expected a 66 chars string (including the 0x prefix) but found {} chars",  val.len())))
                    }
                } else {
                    Err(serde::de::Error::custom(
                        "expected a 0x-prefixed hex string, $ENV_VAR or file: path",
                    ))
                }
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVistor)?;
        Ok(Self(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        key: PrivateKey,
    }

    const KEY: &str =
        "0x000000000000000000000000000000000000000000000000000000000000002a";

    #[test]
    fn parses_a_raw_hex_key() {
        let raw = format!(r#"{{"key": "{KEY}"}}"#);
        let w: Wrapper = serde_json::from_str(&raw).unwrap();
        assert_eq!(w.key.0, H256::from_low_u64_be(42));
    }

    #[test]
    fn reads_key_from_env() {
        std::env::set_var("TEST_SIDEBET_RELAYER_KEY", KEY);
        let w: Wrapper =
            serde_json::from_str(r#"{"key": "$TEST_SIDEBET_RELAYER_KEY"}"#)
                .unwrap();
        assert_eq!(w.key.0, H256::from_low_u64_be(42));
    }

    #[test]
    fn rejects_garbage() {
        let res: Result<Wrapper, _> =
            serde_json::from_str(r#"{"key": "not-a-key"}"#);
        assert!(res.is_err());
    }
}
