//! Layered loading of `ValidationSettings`.
//!
//! Precedence, lowest first:
//! 1. compiled-in defaults (`ValidationSettings::default()`)
//! 2. an optional YAML file
//! 3. environment variables prefixed with `ODATA_VALIDATION_`
//!    (e.g. `ODATA_VALIDATION_MAX_TOP=100`, `ODATA_VALIDATION_ALLOWED_FUNCTIONS=contains,startswith`)

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};

use crate::settings::ValidationSettings;

/// Environment variable prefix recognised by [`load_settings`].
pub const ENV_PREFIX: &str = "ODATA_VALIDATION_";

/// Configuration error for settings loading
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("settings file '{path}' not found")]
    FileNotFound { path: String },
    #[error("invalid validation settings: {source}")]
    Invalid {
        #[source]
        source: Box<figment::Error>,
    },
}

/// Build the figment used by [`load_settings`] without extracting it.
///
/// Exposed so hosts can merge the validation settings into a larger
/// configuration tree of their own.
#[must_use]
pub fn settings_figment(path: Option<&Path>) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(ValidationSettings::default()));
    if let Some(path) = path {
        figment = figment.merge(Yaml::file(path));
    }
    figment.merge(Env::prefixed(ENV_PREFIX))
}

/// Load validation settings from defaults, an optional YAML file and the environment.
///
/// # Errors
/// Returns `ConfigError::FileNotFound` if `path` is given but does not exist.
/// Returns `ConfigError::Invalid` if any layer fails to deserialize.
pub fn load_settings(path: Option<&Path>) -> Result<ValidationSettings, ConfigError> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
    }

    let settings: ValidationSettings =
        settings_figment(path)
            .extract()
            .map_err(|e| ConfigError::Invalid {
                source: Box::new(e),
            })?;

    tracing::debug!(
        max_node_count = settings.max_node_count,
        max_expansion_depth = settings.max_expansion_depth,
        "loaded OData validation settings"
    );
    Ok(settings)
}
