//! Active flow bookkeeping
//!
//! Each flow owns its [`FlowContext`] behind its own mutex, so inputs to one
//! flow are applied strictly in order while other flows proceed. A finished
//! flow hands its address to [`ConfigEntries`] and is forgotten.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use td_config_entries::{ConfigEntries, ConfigEntriesError, ConfigEntry, OPTION_POLL_INTERVAL};
use td_core::{Stage, DOMAIN};
use td_geo::GeoLookup;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{AbortReason, FlowError, FlowManagerError, FlowManagerResult};
use crate::flow::{advance, FlowContext, FlowStep, StepInput, StepOutcome};
use crate::options::FlowOptions;
use crate::result::{FlowResult, FormField};

/// Input field carrying the chosen candidate identifier
pub const FIELD_SELECTION: &str = "selection";
/// Input field requesting the previous step
pub const FIELD_BACK: &str = "back";

struct ActiveFlow {
    context: FlowContext,
    /// Poll interval chosen during the flow, in minutes
    poll_interval: Option<u32>,
    started_at: DateTime<Utc>,
}

/// Summary of an in-progress flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSummary {
    pub flow_id: String,
    pub handler: String,
    pub step_id: String,
    pub started_at: DateTime<Utc>,
}

/// Runs address flows and stores their results as config entries
pub struct FlowManager {
    lookup: Arc<dyn GeoLookup>,
    entries: Arc<ConfigEntries>,
    options: FlowOptions,
    flows: RwLock<HashMap<String, Arc<Mutex<ActiveFlow>>>>,
}

impl FlowManager {
    pub fn new(lookup: Arc<dyn GeoLookup>, entries: Arc<ConfigEntries>, options: FlowOptions) -> Self {
        Self {
            lookup,
            entries,
            options,
            flows: RwLock::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &FlowOptions {
        &self.options
    }

    /// Start a flow for `handler` and return its first form
    pub async fn start_flow(&self, handler: &str) -> FlowManagerResult<FlowResult> {
        if handler != DOMAIN {
            return Err(FlowManagerError::UnknownHandler(handler.to_string()));
        }

        let flow_id = ulid::Ulid::new().to_string();
        let context = FlowContext::new();
        let result = self.render_form(&flow_id, &context, Stage::City, None);

        self.flows.write().await.insert(
            flow_id.clone(),
            Arc::new(Mutex::new(ActiveFlow {
                context,
                poll_interval: None,
                started_at: Utc::now(),
            })),
        );

        info!("Started address flow {}", flow_id);
        Ok(result)
    }

    /// Apply user input to a flow; `None` re-shows the current form
    pub async fn progress_flow(
        &self,
        flow_id: &str,
        user_input: Option<Value>,
    ) -> FlowManagerResult<FlowResult> {
        let flow = self.flow(flow_id).await?;
        let mut active = flow.lock().await;

        // Finished while this call waited for the lock
        if active.context.step().is_terminal() {
            return Err(FlowManagerError::UnknownFlow(flow_id.to_string()));
        }

        let (input, poll_interval) = parse_input(active.context.step(), user_input.as_ref())?;
        if poll_interval.is_some() {
            active.poll_interval = poll_interval;
        }
        debug!("Flow {} at {:?} <- {:?}", flow_id, active.context.step(), input);

        let (context, outcome) = advance(
            self.lookup.as_ref(),
            &self.options,
            active.context.clone(),
            input,
        )
        .await;

        match outcome {
            StepOutcome::Form { stage, error } => {
                let result = self.render_form(flow_id, &context, stage, error);
                active.context = context;
                Ok(result)
            }
            StepOutcome::Complete(record) => {
                let poll_interval = active.poll_interval.unwrap_or(self.options.default_poll_interval);
                let entry = ConfigEntry::for_address(&record).with_poll_interval(poll_interval);

                let result = match self.entries.add(entry).await {
                    Ok(entry) => {
                        info!("Flow {} created entry {} ({})", flow_id, entry.entry_id, entry.title);
                        FlowResult::create_entry(
                            flow_id,
                            DOMAIN,
                            &entry.title,
                            entry.version,
                            serde_json::to_value(&entry).unwrap_or_default(),
                        )
                    }
                    Err(ConfigEntriesError::AlreadyExists { unique_id, .. }) => {
                        info!("Flow {} aborted, {} is already configured", flow_id, unique_id);
                        FlowResult::abort(flow_id, DOMAIN, AbortReason::AlreadyConfigured.code())
                    }
                    // Context stays before completion so the submission can be retried
                    Err(e) => return Err(e.into()),
                };

                active.context = context;
                drop(active);
                self.forget(flow_id).await;
                Ok(result)
            }
            StepOutcome::Abandoned => {
                active.context = context;
                drop(active);
                self.forget(flow_id).await;
                info!("Flow {} abandoned", flow_id);
                Ok(FlowResult::abort(flow_id, DOMAIN, AbortReason::UserCancelled.code()))
            }
        }
    }

    /// Cancel a flow
    pub async fn abort_flow(&self, flow_id: &str) -> FlowManagerResult<FlowResult> {
        let flow = self
            .flows
            .write()
            .await
            .remove(flow_id)
            .ok_or_else(|| FlowManagerError::UnknownFlow(flow_id.to_string()))?;

        let mut active = flow.lock().await;
        let (context, _) = advance(
            self.lookup.as_ref(),
            &self.options,
            active.context.clone(),
            StepInput::Cancel,
        )
        .await;
        active.context = context;

        info!("Flow {} aborted by user", flow_id);
        Ok(FlowResult::abort(flow_id, DOMAIN, AbortReason::UserCancelled.code()))
    }

    /// In-progress flows, oldest first
    pub async fn list_flows(&self) -> Vec<FlowSummary> {
        let flows: Vec<(String, Arc<Mutex<ActiveFlow>>)> = self
            .flows
            .read()
            .await
            .iter()
            .map(|(id, flow)| (id.clone(), flow.clone()))
            .collect();

        let mut summaries = Vec::with_capacity(flows.len());
        for (flow_id, flow) in flows {
            let active = flow.lock().await;
            if active.context.step().is_terminal() {
                continue;
            }
            summaries.push(FlowSummary {
                flow_id,
                handler: DOMAIN.to_string(),
                step_id: active.context.step().step_id().to_string(),
                started_at: active.started_at,
            });
        }
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.flows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.flows.read().await.is_empty()
    }

    async fn flow(&self, flow_id: &str) -> FlowManagerResult<Arc<Mutex<ActiveFlow>>> {
        self.flows
            .read()
            .await
            .get(flow_id)
            .cloned()
            .ok_or_else(|| FlowManagerError::UnknownFlow(flow_id.to_string()))
    }

    async fn forget(&self, flow_id: &str) {
        self.flows.write().await.remove(flow_id);
    }

    fn render_form(
        &self,
        flow_id: &str,
        context: &FlowContext,
        stage: Stage,
        error: Option<FlowError>,
    ) -> FlowResult {
        let last_step = stage == Stage::FlatNumber;

        let mut schema = vec![FormField::text(stage.key(), !last_step)];
        if !context.candidates().is_empty() {
            schema.push(FormField::select(FIELD_SELECTION, context.candidates()));
        }
        if last_step {
            schema.push(FormField::integer(
                OPTION_POLL_INTERVAL,
                self.options.default_poll_interval,
            ));
        }

        let errors = error
            .map(|e| HashMap::from([(e.field(stage).to_string(), e.code().to_string())]))
            .unwrap_or_default();

        // Names confirmed so far, for the form description
        let placeholders = Stage::ALL
            .iter()
            .filter(|s| **s < stage)
            .filter_map(|s| {
                context
                    .resolution()
                    .get(*s)
                    .map(|c| (s.key().to_string(), c.display_name.clone()))
            })
            .collect();

        FlowResult::form(
            flow_id,
            DOMAIN,
            FlowStep::awaiting(stage).step_id(),
            schema,
            errors,
            placeholders,
            last_step,
        )
    }
}

/// Map a JSON submission onto a step input plus an optional poll interval
///
/// - `null` shows the form again
/// - `{"back": true}` goes back
/// - `{"selection": "<id>"}` picks a presented candidate
/// - `{"<stage field>": "<text>"}` searches; a missing field searches for ""
pub fn parse_input(
    step: FlowStep,
    user_input: Option<&Value>,
) -> FlowManagerResult<(StepInput, Option<u32>)> {
    let map = match user_input {
        None | Some(Value::Null) => return Ok((StepInput::Show, None)),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(FlowManagerError::InvalidInput(format!(
                "expected an object, got {}",
                other
            )))
        }
    };

    let poll_interval = match map.get(OPTION_POLL_INTERVAL) {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_u64()
                .filter(|minutes| *minutes > 0)
                .and_then(|minutes| u32::try_from(minutes).ok())
                .ok_or_else(|| {
                    FlowManagerError::InvalidInput(format!(
                        "{} must be a positive number of minutes",
                        OPTION_POLL_INTERVAL
                    ))
                })?,
        ),
    };

    if map.get(FIELD_BACK).and_then(Value::as_bool) == Some(true) {
        return Ok((StepInput::Back, poll_interval));
    }

    if let Some(selection) = map.get(FIELD_SELECTION).filter(|v| !v.is_null()) {
        let identifier = scalar_text(FIELD_SELECTION, selection)?;
        return Ok((StepInput::Select(identifier), poll_interval));
    }

    let Some(stage) = step.stage() else {
        return Ok((StepInput::Show, poll_interval));
    };
    let text = match map.get(stage.key()) {
        None | Some(Value::Null) => String::new(),
        Some(value) => scalar_text(stage.key(), value)?,
    };
    Ok((StepInput::Search(text), poll_interval))
}

/// House and flat numbers may arrive as JSON numbers
fn scalar_text(field: &str, value: &Value) -> FlowManagerResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(FlowManagerError::InvalidInput(format!(
            "{} must be a string, got {}",
            field, other
        ))),
    }
}
