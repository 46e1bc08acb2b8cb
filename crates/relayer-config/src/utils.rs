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

use config::{Config, File};
use std::path::{Path, PathBuf};

use super::*;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> sidebet_relayer_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)
        .map_err(|e| sidebet_relayer_utils::Error::Validation(e.to_string()))?;
    let json_files = glob::glob(&json_pattern)
        .map_err(|e| sidebet_relayer_utils::Error::Validation(e.to_string()))?;
    toml_files
        .chain(json_files)
        .map(|v| {
            v.map_err(|e| {
                sidebet_relayer_utils::Error::Validation(e.to_string())
            })
        })
        .collect()
}

/// Try to parse the [`SidebetRelayerConfig`] from the given config file(s),
/// merging in the process environment on top.
pub fn parse_from_files(
    files: &[PathBuf],
) -> sidebet_relayer_utils::Result<SidebetRelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        // get file extension
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment, so `DATABASE_URL` overrides the
    // `database_url` key and `SCHEDULER__SYNC_INTERVAL_SECS` reaches into
    // the scheduler section.
    let builder =
        builder.add_source(config::Environment::default().separator("__"));
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        SidebetRelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files and the environment.
///
/// Returns `Ok(SidebetRelayerConfig)` on success, or the parse error on
/// failure. It is the same as using the [`search_config_files`] and
/// [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> sidebet_relayer_utils::Result<SidebetRelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// Load the configuration from the environment alone, with no config
/// directory. This is the common deployment shape (twelve-factor).
pub fn load_from_env() -> sidebet_relayer_utils::Result<SidebetRelayerConfig> {
    parse_from_files(&[])
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    config: SidebetRelayerConfig,
) -> sidebet_relayer_utils::Result<SidebetRelayerConfig> {
    tracing::trace!("Checking configration sanity ...");
    if config.rate_limit_window_ms == 0 {
        return Err(sidebet_relayer_utils::Error::Validation(
            "rate_limit_window_ms must be greater than zero".into(),
        ));
    }
    if config.scheduler.finalize_sweep_interval_secs == 0
        || config.scheduler.sync_interval_secs == 0
    {
        return Err(sidebet_relayer_utils::Error::Validation(
            "scheduler cadences must be greater than zero".into(),
        ));
    }
    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );
    Ok(config)
}
