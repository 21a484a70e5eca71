use thiserror::Error;

use kitamo_config::ConfigError;
use kitamo_core::CoreError;

/// Error type surfaced by the application layer.
#[derive(Debug, Error)]
pub enum KitamoError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl KitamoError {
    /// True for rejected input as opposed to storage or configuration failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            KitamoError::Core(CoreError::Validation(_) | CoreError::InvalidOperation(_))
        )
    }
}
