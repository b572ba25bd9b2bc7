//! Serializable flow results
//!
//! The JSON shape mirrors what config-flow clients expect: a `type` of
//! `form`, `create_entry` or `abort`, the form schema and any errors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use td_core::Candidate;

pub const RESULT_FORM: &str = "form";
pub const RESULT_CREATE_ENTRY: &str = "create_entry";
pub const RESULT_ABORT: &str = "abort";

/// Result of starting or progressing a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    pub flow_id: String,
    /// Integration domain
    pub handler: String,
    /// `form`, `create_entry` or `abort`
    #[serde(rename = "type")]
    pub result_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Always present, empty unless `type` is `form`
    #[serde(default)]
    pub data_schema: Vec<FormField>,
    /// Field name -> error code; null when there are none
    pub errors: Option<HashMap<String, String>>,
    pub description_placeholders: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Abort reason code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// The created config entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Whether submitting this form may finish the flow
    pub last_step: Option<bool>,
}

impl FlowResult {
    fn base(flow_id: &str, handler: &str, result_type: &str) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            handler: handler.to_string(),
            result_type: result_type.to_string(),
            step_id: None,
            data_schema: Vec::new(),
            errors: None,
            description_placeholders: None,
            title: None,
            reason: None,
            version: None,
            result: None,
            last_step: None,
        }
    }

    pub fn form(
        flow_id: &str,
        handler: &str,
        step_id: &str,
        data_schema: Vec<FormField>,
        errors: HashMap<String, String>,
        placeholders: HashMap<String, String>,
        last_step: bool,
    ) -> Self {
        Self {
            step_id: Some(step_id.to_string()),
            data_schema,
            errors: (!errors.is_empty()).then_some(errors),
            description_placeholders: (!placeholders.is_empty()).then_some(placeholders),
            last_step: Some(last_step),
            ..Self::base(flow_id, handler, RESULT_FORM)
        }
    }

    pub fn create_entry(
        flow_id: &str,
        handler: &str,
        title: &str,
        version: u32,
        entry: serde_json::Value,
    ) -> Self {
        Self {
            title: Some(title.to_string()),
            version: Some(version),
            result: Some(entry),
            ..Self::base(flow_id, handler, RESULT_CREATE_ENTRY)
        }
    }

    pub fn abort(flow_id: &str, handler: &str, reason: &str) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::base(flow_id, handler, RESULT_ABORT)
        }
    }

    pub fn is_form(&self) -> bool {
        self.result_type == RESULT_FORM
    }

    pub fn is_create_entry(&self) -> bool {
        self.result_type == RESULT_CREATE_ENTRY
    }

    pub fn is_abort(&self) -> bool {
        self.result_type == RESULT_ABORT
    }

    /// `entry_id` of the created entry, for `create_entry` results
    pub fn entry_id(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|entry| entry.get("entry_id"))
            .and_then(|id| id.as_str())
    }

    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors
            .as_ref()
            .and_then(|errors| errors.get(field))
            .map(String::as_str)
    }

    /// Identifiers offered by the `selection` field, in presentation order
    pub fn choices(&self) -> Vec<&str> {
        self.data_schema
            .iter()
            .filter_map(|field| field.options.as_ref())
            .flatten()
            .map(|choice| choice.value.as_str())
            .collect()
    }
}

/// Form field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    /// `string`, `integer` or `select`
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FieldChoice>>,
}

impl FormField {
    pub fn text(name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type: "string".to_string(),
            required: Some(required),
            default: (!required).then(|| serde_json::Value::String(String::new())),
            options: None,
        }
    }

    pub fn integer(name: &str, default: u32) -> Self {
        Self {
            name: name.to_string(),
            field_type: "integer".to_string(),
            required: Some(false),
            default: Some(serde_json::json!(default)),
            options: None,
        }
    }

    pub fn select(name: &str, candidates: &[Candidate]) -> Self {
        Self {
            name: name.to_string(),
            field_type: "select".to_string(),
            required: Some(true),
            default: None,
            options: Some(candidates.iter().map(FieldChoice::from).collect()),
        }
    }
}

/// One choice of a `select` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChoice {
    pub value: String,
    pub label: String,
}

impl From<&Candidate> for FieldChoice {
    fn from(candidate: &Candidate) -> Self {
        Self {
            value: candidate.identifier.clone(),
            label: candidate.display_name.clone(),
        }
    }
}
