use td_core::EntityIdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("config entry {0} does not hold a complete address")]
    InvalidEntry(String),

    #[error("poll interval must be a positive number of minutes")]
    InvalidPollInterval,

    #[error("cannot derive entity id: {0}")]
    EntityId(#[from] EntityIdError),
}

pub type SensorResult<T> = Result<T, SensorError>;
