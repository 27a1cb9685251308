use config::LoadConfigError;
use config::load_config;
use config::shared::RunnerConfig;
use tracing::debug;

use crate::cli::RunArgs;
use crate::error::{RunnerError, RunnerResult};

/// Loads the runner configuration.
///
/// A missing `configuration` directory is not an error: the runner then starts from the
/// defaults.
pub fn load_runner_config() -> RunnerResult<RunnerConfig> {
    match load_config::<RunnerConfig>() {
        Ok(config) => Ok(config),
        Err(LoadConfigError::MissingConfigurationDirectory(directory)) => {
            debug!(directory = %directory.display(), "no configuration directory, using defaults");
            Ok(RunnerConfig::default())
        }
        Err(err) => Err(RunnerError::config(err)),
    }
}

/// Applies the command line overrides of `run` and validates the result.
pub fn apply_run_args(mut config: RunnerConfig, args: &RunArgs) -> RunnerResult<RunnerConfig> {
    if let Some(workers) = args.parallelism {
        config.pipeline.workers = workers;
    }
    if let Some(ordering) = args.ordering {
        config.pipeline.ordering = ordering.into();
    }

    config.validate().map_err(RunnerError::config)?;

    Ok(config)
}
