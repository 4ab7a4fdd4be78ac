//! Configuration module
//!
//! Key registry, layered argument dictionaries and configuration sources.

mod args;
mod env;
mod file;
mod registry;

pub use args::{ArgDict, ArgLayers, Layer, MergePass, Opts};
pub use env::EnvConfig;
pub use file::expand_path;
pub use registry::{lookup, ConfigError};

use file::ConfigFile;
use registry::validate_registry;

use tracing::debug;

/// Build the argument layers for a run from explicit user settings.
///
/// The default layer comes from the built-in configuration and the config
/// layer from `<config_dir>/<config_name>.yaml` when that file exists. The
/// internal and file layers start empty.
pub fn load_layers(user: ArgDict, env: &EnvConfig) -> Result<ArgLayers, ConfigError> {
    validate_registry()?;

    let layers = ArgLayers {
        user,
        default: ConfigFile::builtin()?.into_dict()?,
        ..Default::default()
    };

    let config_dir = match layers.layer(Layer::User).get("config_dir") {
        Some(values) => values.last().map(|v| expand_path(v)),
        None => env.config_dir.clone(),
    };
    let config_dir = match config_dir {
        Some(dir) => dir,
        None => expand_path(&layers.resolve("config_dir", "conf")?),
    };
    let config_name = layers.resolve("config_name", &env.host_or("localhost"))?;

    debug!(
        "Looking for configuration {} in {}",
        config_name,
        config_dir.display()
    );
    let config = ConfigFile::load_named(&config_dir, &config_name)?.into_dict()?;

    Ok(layers.with_layer(Layer::Config, config))
}
