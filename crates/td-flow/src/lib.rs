//! Address resolution flow
//!
//! Walks a user through city, street, house number and optional flat
//! number, each lookup scoped by the identifiers confirmed before it.
//!
//! # Key Types
//!
//! - [`advance`] - The pure transition function over a [`FlowContext`]
//! - [`FlowManager`] - Keeps active flows by id and turns finished ones into
//!   config entries
//! - [`FlowResult`] - JSON result returned to clients
//!
//! # Errors
//!
//! Step problems are reported on the re-shown form, never as failures:
//!
//! | code                   | meaning                                   |
//! |------------------------|-------------------------------------------|
//! | `too_short`            | input below the stage minimum, no lookup  |
//! | `invalid_selection`    | identifier not among presented candidates |
//! | `invalid_<stage>`      | lookup returned nothing                   |
//! | `cannot_connect`       | lookup failed, state kept                 |
//!
//! A flow whose address is already configured aborts with
//! `already_configured`.

mod error;
mod flow;
mod manager;
mod options;
mod result;

pub use error::{AbortReason, FlowError, FlowManagerError, FlowManagerResult};
pub use flow::{advance, FlowContext, FlowStep, StepInput, StepOutcome};
pub use manager::{parse_input, FlowManager, FlowSummary, FIELD_BACK, FIELD_SELECTION};
pub use options::FlowOptions;
pub use result::{
    FieldChoice, FlowResult, FormField, RESULT_ABORT, RESULT_CREATE_ENTRY, RESULT_FORM,
};
