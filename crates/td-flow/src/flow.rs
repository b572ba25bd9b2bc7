//! Address resolution state machine
//!
//! ```text
//! AwaitCity → AwaitStreet → AwaitHouseNumber → AwaitFlatNumber → Complete
//!     └────────────── Cancel from any await step ──────────────→ Abandoned
//! ```
//!
//! [`advance`] is the whole machine: it takes the current [`FlowContext`]
//! and one [`StepInput`], and returns the next context plus what to show.
//! Lookups are the only suspension points.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use td_core::{AddressRecord, Candidate, IncompleteAddress, ResolutionState, Stage};
use td_geo::{GeoLookup, LookupQuery};
use tracing::{debug, warn};

use crate::error::FlowError;
use crate::options::FlowOptions;

/// Where a flow currently is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    #[default]
    AwaitCity,
    AwaitStreet,
    AwaitHouseNumber,
    AwaitFlatNumber,
    Complete,
    Abandoned,
}

impl FlowStep {
    /// Step that collects `stage`
    pub fn awaiting(stage: Stage) -> Self {
        match stage {
            Stage::City => FlowStep::AwaitCity,
            Stage::Street => FlowStep::AwaitStreet,
            Stage::HouseNumber => FlowStep::AwaitHouseNumber,
            Stage::FlatNumber => FlowStep::AwaitFlatNumber,
        }
    }

    /// Stage collected by this step; `None` once terminal
    pub fn stage(self) -> Option<Stage> {
        match self {
            FlowStep::AwaitCity => Some(Stage::City),
            FlowStep::AwaitStreet => Some(Stage::Street),
            FlowStep::AwaitHouseNumber => Some(Stage::HouseNumber),
            FlowStep::AwaitFlatNumber => Some(Stage::FlatNumber),
            FlowStep::Complete | FlowStep::Abandoned => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.stage().is_none()
    }

    pub fn step_id(self) -> &'static str {
        match self {
            FlowStep::Complete => "complete",
            FlowStep::Abandoned => "abandoned",
            step => step.stage().map(Stage::key).unwrap_or_default(),
        }
    }
}

/// One user action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInput {
    /// Render the current form again
    Show,
    /// Partial name or number to look up
    Search(String),
    /// Identifier of a presented candidate
    Select(String),
    Back,
    Cancel,
}

/// Everything a flow remembers between inputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowContext {
    step: FlowStep,
    resolution: ResolutionState,
    /// Candidates presented for the current stage, not yet confirmed
    candidates: Vec<Candidate>,
}

impl FlowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> FlowStep {
        self.step
    }

    pub fn resolution(&self) -> &ResolutionState {
        &self.resolution
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }
}

/// What the caller should do after a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Show the form for `stage`, with the context's candidates as choices
    Form {
        stage: Stage,
        error: Option<FlowError>,
    },
    /// The address is resolved
    Complete(AddressRecord),
    Abandoned,
}

/// Apply one input to a flow
pub async fn advance(
    lookup: &dyn GeoLookup,
    options: &FlowOptions,
    ctx: FlowContext,
    input: StepInput,
) -> (FlowContext, StepOutcome) {
    if input == StepInput::Cancel {
        return abandon(ctx);
    }

    match ctx.step {
        FlowStep::AwaitCity => await_city(lookup, options, ctx, input).await,
        FlowStep::AwaitStreet => await_street(lookup, options, ctx, input).await,
        FlowStep::AwaitHouseNumber => await_house_number(lookup, options, ctx, input).await,
        FlowStep::AwaitFlatNumber => await_flat_number(lookup, options, ctx, input).await,
        FlowStep::Complete => complete(ctx),
        FlowStep::Abandoned => abandon(ctx),
    }
}

async fn await_city(
    lookup: &dyn GeoLookup,
    options: &FlowOptions,
    mut ctx: FlowContext,
    input: StepInput,
) -> (FlowContext, StepOutcome) {
    if input == StepInput::Back {
        ctx.candidates.clear();
        return prompt(ctx, Stage::City, None);
    }
    resolve_stage(lookup, options, ctx, Stage::City, input).await
}

async fn await_street(
    lookup: &dyn GeoLookup,
    options: &FlowOptions,
    ctx: FlowContext,
    input: StepInput,
) -> (FlowContext, StepOutcome) {
    if input == StepInput::Back {
        return go_back(ctx, Stage::City);
    }
    resolve_stage(lookup, options, ctx, Stage::Street, input).await
}

async fn await_house_number(
    lookup: &dyn GeoLookup,
    options: &FlowOptions,
    ctx: FlowContext,
    input: StepInput,
) -> (FlowContext, StepOutcome) {
    if input == StepInput::Back {
        return go_back(ctx, Stage::Street);
    }
    resolve_stage(lookup, options, ctx, Stage::HouseNumber, input).await
}

async fn await_flat_number(
    lookup: &dyn GeoLookup,
    options: &FlowOptions,
    mut ctx: FlowContext,
    input: StepInput,
) -> (FlowContext, StepOutcome) {
    match input {
        StepInput::Back => go_back(ctx, Stage::HouseNumber),
        StepInput::Search(ref text) if text.trim().is_empty() => {
            debug!("No flat number given, completing without one");
            if let Err(missing) = ctx.resolution.skip_flat_number() {
                return rewind(ctx, missing);
            }
            ctx.candidates.clear();
            complete(ctx)
        }
        input => resolve_stage(lookup, options, ctx, Stage::FlatNumber, input).await,
    }
}

/// Search or select within one stage
async fn resolve_stage(
    lookup: &dyn GeoLookup,
    options: &FlowOptions,
    mut ctx: FlowContext,
    stage: Stage,
    input: StepInput,
) -> (FlowContext, StepOutcome) {
    match input {
        StepInput::Search(text) => {
            let text = text.trim();
            let required = LookupQuery::required_length(stage, options.min_query_length);
            if text.chars().count() < required {
                return prompt(ctx, stage, Some(FlowError::TooShort));
            }

            let query = match LookupQuery::for_stage(stage, &ctx.resolution, text) {
                Ok(query) => query,
                Err(missing) => return rewind(ctx, missing),
            };

            let mut candidates = match lookup.query(&query).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("{} lookup for {:?} failed: {}", stage, text, e);
                    return prompt(ctx, stage, Some(FlowError::CannotConnect));
                }
            };

            candidates.retain(|c| !c.identifier.is_empty());
            if options.dedup_display_names {
                let mut seen = HashSet::new();
                candidates.retain(|c| seen.insert(c.display_name.clone()));
            }

            match candidates.len() {
                0 => {
                    ctx.candidates.clear();
                    prompt(ctx, stage, Some(FlowError::NoMatch(stage)))
                }
                1 if options.auto_select_single_match => {
                    let only = candidates.remove(0);
                    debug!("Auto-selecting single {} match {:?}", stage, only.display_name);
                    confirm(ctx, stage, only)
                }
                n => {
                    debug!("Presenting {} {} candidates", n, stage);
                    ctx.candidates = candidates;
                    prompt(ctx, stage, None)
                }
            }
        }
        StepInput::Select(identifier) => {
            let selected = ctx
                .candidates
                .iter()
                .find(|c| c.identifier == identifier)
                .cloned();
            match selected {
                Some(candidate) => confirm(ctx, stage, candidate),
                None => prompt(ctx, stage, Some(FlowError::InvalidSelection)),
            }
        }
        StepInput::Show | StepInput::Back | StepInput::Cancel => prompt(ctx, stage, None),
    }
}

/// Record a selection and move to the next step
fn confirm(mut ctx: FlowContext, stage: Stage, candidate: Candidate) -> (FlowContext, StepOutcome) {
    if let Err(missing) = ctx.resolution.set(stage, candidate) {
        return rewind(ctx, missing);
    }
    ctx.candidates.clear();

    match stage.next() {
        Some(next) => {
            ctx.step = FlowStep::awaiting(next);
            prompt(ctx, next, None)
        }
        None => complete(ctx),
    }
}

/// Return to `stage`, keeping every confirmed identifier
fn go_back(mut ctx: FlowContext, stage: Stage) -> (FlowContext, StepOutcome) {
    ctx.candidates.clear();
    ctx.step = FlowStep::awaiting(stage);
    prompt(ctx, stage, None)
}

fn complete(mut ctx: FlowContext) -> (FlowContext, StepOutcome) {
    match ctx.resolution.to_record() {
        Ok(record) => {
            ctx.step = FlowStep::Complete;
            (ctx, StepOutcome::Complete(record))
        }
        Err(missing) => rewind(ctx, missing),
    }
}

fn abandon(mut ctx: FlowContext) -> (FlowContext, StepOutcome) {
    ctx.step = FlowStep::Abandoned;
    ctx.candidates.clear();
    (ctx, StepOutcome::Abandoned)
}

/// Recover from a context whose confirmed stages do not line up
fn rewind(mut ctx: FlowContext, missing: IncompleteAddress) -> (FlowContext, StepOutcome) {
    warn!("Flow context is missing {}, returning to it", missing.missing);
    ctx.candidates.clear();
    ctx.step = FlowStep::awaiting(missing.missing);
    prompt(ctx, missing.missing, None)
}

fn prompt(ctx: FlowContext, stage: Stage, error: Option<FlowError>) -> (FlowContext, StepOutcome) {
    (ctx, StepOutcome::Form { stage, error })
}
