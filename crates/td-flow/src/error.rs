//! Step errors and abort reasons
//!
//! Step errors never end a flow: the current form is shown again with the
//! error attached to the offending field. Only an abort ends it.

use td_core::Stage;
use thiserror::Error;

/// Error annotation on a re-shown form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlowError {
    /// Partial name below the stage minimum; nothing was queried
    #[error("input is too short")]
    TooShort,

    /// Selected identifier was not among the presented candidates
    #[error("selection is not one of the presented candidates")]
    InvalidSelection,

    /// The lookup answered with an empty list
    #[error("no {0} matches the input")]
    NoMatch(Stage),

    /// The lookup failed; the step can be retried
    #[error("cannot reach the lookup service")]
    CannotConnect,
}

impl FlowError {
    /// Error code reported to the client
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::TooShort => "too_short",
            FlowError::InvalidSelection => "invalid_selection",
            FlowError::NoMatch(Stage::City) => "invalid_city",
            FlowError::NoMatch(Stage::Street) => "invalid_street",
            FlowError::NoMatch(Stage::HouseNumber) => "invalid_house_number",
            FlowError::NoMatch(Stage::FlatNumber) => "invalid_flat_number",
            FlowError::CannotConnect => "cannot_connect",
        }
    }

    /// Form field the error is attached to at `stage`
    pub fn field(&self, stage: Stage) -> &'static str {
        match self {
            FlowError::TooShort | FlowError::NoMatch(_) => stage.key(),
            FlowError::InvalidSelection => "selection",
            FlowError::CannotConnect => "base",
        }
    }
}

/// Why a flow ended without creating an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// An entry for the same address already exists
    AlreadyConfigured,
    UserCancelled,
}

impl AbortReason {
    pub fn code(&self) -> &'static str {
        match self {
            AbortReason::AlreadyConfigured => "already_configured",
            AbortReason::UserCancelled => "user_cancelled",
        }
    }
}

/// Errors from the flow manager itself, as opposed to step annotations
#[derive(Debug, Error)]
pub enum FlowManagerError {
    #[error("unknown flow: {0}")]
    UnknownFlow(String),

    #[error("no flow handler for {0}")]
    UnknownHandler(String),

    #[error("invalid user input: {0}")]
    InvalidInput(String),

    #[error("failed to save config entry: {0}")]
    Entries(#[from] td_config_entries::ConfigEntriesError),
}

pub type FlowManagerResult<T> = Result<T, FlowManagerError>;
