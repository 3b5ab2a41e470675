use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::StoreError;

/// Top-level error for starting the service
#[derive(Debug, Error)]
pub enum RespCalcError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
