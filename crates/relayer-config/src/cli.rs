use crate::SidebetRelayerConfig;
use anyhow::Context;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

/// The Sidebet Relayer Command-line tool
///
/// Start the relayer from a config directory:
///
/// $ sidebet-relayer -vvv -c <CONFIG_DIR_PATH>
#[derive(StructOpt)]
#[structopt(name = "Sidebet Relayer")]
pub struct Opts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: i32,
    /// Directory that contains configration files. When omitted the
    /// relayer is configured from the environment alone.
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str)
    )]
    pub config_dir: Option<PathBuf>,
}

/// Loads the configuration from the given directory, falling back to the
/// process environment when no directory is given.
///
/// Returns `Ok(SidebetRelayerConfig)` on success, or
/// `Err(anyhow::Error)` on failure.
///
/// # Arguments
///
/// * `config_dir` - An optional `PathBuf` representing the directory that
///   contains the configuration.
pub fn load_config<P>(
    config_dir: Option<P>,
) -> Result<SidebetRelayerConfig, anyhow::Error>
where
    P: AsRef<Path>,
{
    let config = match config_dir {
        Some(p) => {
            let path = p.as_ref();
            // return an error if the path is not a directory.
            if !path.is_dir() {
                return Err(anyhow::anyhow!(
                    "{} is not a directory",
                    path.display()
                ));
            }
            tracing::trace!("Loading Config from {} ..", path.display());
            crate::utils::load(path)
        }
        None => {
            tracing::trace!("Loading Config from the environment ..");
            crate::utils::load_from_env()
        }
    }
    .context("failed to load the configuration")?;
    tracing::trace!("Config loaded..");
    Ok(config)
}

/// Sets up the logger for the relayer, based on the verbosity level passed in.
///
/// Returns `Ok(())` on success, or `Err(anyhow::Error)` on failure.
///
/// # Arguments
///
/// * `verbosity` - An i32 integer representing the verbosity level.
/// * `filter` - An &str representing the log target filter directive.
pub fn setup_logger(verbosity: i32, filter: &str) -> anyhow::Result<()> {
    use tracing::Level;
    let log_level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let directive_1 = format!("{filter}={log_level}")
        .parse()
        .expect("valid log level");
    let directive_2 = format!("sidebet_relayer={log_level}")
        .parse()
        .expect("valid log level");
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(directive_1)
        .add_directive(directive_2);
    let logger = tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_env_filter(env_filter);
    // if we are not compiling for integration tests, we should use pretty logs
    #[cfg(not(feature = "integration-tests"))]
    let logger = logger.pretty();
    // otherwise, we should use json, which is easy to parse.
    #[cfg(feature = "integration-tests")]
    let logger = logger.json().flatten_event(true).with_current_span(false);

    logger.init();
    Ok(())
}
