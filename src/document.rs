//! Declarative machine documents and load validation.
//!
//! A machine document is a JSON value:
//!
//! ```json
//! {
//!   "name": "even-zeros",
//!   "alphabet": ["0", "1"],
//!   "initialState": "S1",
//!   "initialData": {"count": 0},
//!   "states": [
//!     {"name": "S1", "isAcceptance": true,
//!      "transition": "if data == '0' then {to: 'S2'} else {to: 'S1'}"},
//!     {"name": "S2", "isAcceptance": false,
//!      "transition": "if data == '0' then {to: 'S1'} else {to: 'S2'}"}
//!   ]
//! }
//! ```
//!
//! `name`, `alphabet` and `states` are required; `initialState` and
//! `initialData` are optional. Validation is staged: the whole document,
//! including every transition program, is checked before the machine is
//! touched, so a rejected document leaves the machine unchanged.

use crate::error::EngineError;
use crate::program::TransitionProgram;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome classification for a declarative load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadStatus {
    /// No document was supplied.
    NoData,
    /// The document lacks `name`, `alphabet` or `states`.
    MissingRequiredProperties,
    /// A present field has the wrong shape.
    InvalidDataShape,
    /// The `states` sequence is empty.
    EmptyStateList,
    /// The document was accepted.
    Valid,
}

impl LoadStatus {
    /// Returns a stable code for protocol/log surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            LoadStatus::NoData => "NO_DATA",
            LoadStatus::MissingRequiredProperties => "MISSING_REQUIRED_PROPERTIES",
            LoadStatus::InvalidDataShape => "INVALID_DATA_SHAPE",
            LoadStatus::EmptyStateList => "EMPTY_STATE_LIST",
            LoadStatus::Valid => "VALID",
        }
    }
}

/// Report returned by [`crate::Machine::from_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Whether the document was accepted.
    pub success: bool,

    /// Classification of the outcome.
    pub status: LoadStatus,

    /// Offending document fragment, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<Value>,
}

impl LoadReport {
    pub(crate) fn valid() -> Self {
        Self {
            success: true,
            status: LoadStatus::Valid,
            node: None,
        }
    }

    pub(crate) fn failure(status: LoadStatus, node: Option<Value>) -> Self {
        Self {
            success: false,
            status,
            node,
        }
    }
}

/// Fully validated document, staged before any machine mutation.
#[derive(Debug)]
pub(crate) struct LoadedDocument {
    pub name: String,
    pub alphabet: Vec<String>,
    pub initial_state: Option<String>,
    pub initial_data: Option<Value>,
    pub states: Vec<LoadedState>,
    pub checksum: String,
}

#[derive(Debug)]
pub(crate) struct LoadedState {
    pub name: String,
    pub acceptance: bool,
    pub program: TransitionProgram,
}

fn shape_error(node: &Value) -> LoadReport {
    LoadReport::failure(LoadStatus::InvalidDataShape, Some(node.clone()))
}

/// Validates a document into a staging value. Checks run in document
/// order: required properties, alphabet, states shape, each state
/// descriptor (including its transition compile), then `initialData`.
pub(crate) fn validate(doc: Option<&Value>) -> Result<LoadedDocument, LoadReport> {
    let doc = match doc {
        Some(value) if !value.is_null() => value,
        _ => return Err(LoadReport::failure(LoadStatus::NoData, None)),
    };

    if doc.get("name").is_none() || doc.get("alphabet").is_none() || doc.get("states").is_none() {
        return Err(LoadReport::failure(
            LoadStatus::MissingRequiredProperties,
            Some(doc.clone()),
        ));
    }

    let name = match doc["name"].as_str() {
        Some(name) => name.to_string(),
        None => return Err(shape_error(&doc["name"])),
    };

    let alphabet_value = &doc["alphabet"];
    let alphabet = match alphabet_value.as_array() {
        Some(letters) => letters,
        None => return Err(shape_error(alphabet_value)),
    };
    let mut letters = Vec::with_capacity(alphabet.len());
    for letter in alphabet {
        match letter.as_str() {
            Some(letter) => letters.push(letter.to_string()),
            None => return Err(shape_error(alphabet_value)),
        }
    }

    let states_value = &doc["states"];
    let states = match states_value.as_array() {
        Some(states) => states,
        None => return Err(shape_error(states_value)),
    };
    if states.is_empty() {
        return Err(LoadReport::failure(
            LoadStatus::EmptyStateList,
            Some(states_value.clone()),
        ));
    }

    let initial_state = match doc.get("initialState") {
        None | Some(Value::Null) => None,
        Some(Value::String(state)) => Some(state.clone()),
        Some(other) => return Err(shape_error(other)),
    };

    let mut loaded_states = Vec::with_capacity(states.len());
    for descriptor in states {
        loaded_states.push(validate_state(descriptor)?);
    }

    let initial_data = match doc.get("initialData") {
        None | Some(Value::Null) => None,
        Some(value @ Value::Object(_)) => Some(value.clone()),
        Some(other) => return Err(shape_error(other)),
    };

    let bytes = serde_json::to_vec(doc).unwrap_or_default();
    let checksum = format!("{:08x}", crc32c::crc32c(&bytes));

    Ok(LoadedDocument {
        name,
        alphabet: letters,
        initial_state,
        initial_data,
        states: loaded_states,
        checksum,
    })
}

fn validate_state(descriptor: &Value) -> Result<LoadedState, LoadReport> {
    let fields = match descriptor.as_object() {
        Some(fields) => fields,
        None => return Err(shape_error(descriptor)),
    };

    let name = match fields.get("name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => return Err(shape_error(descriptor)),
    };
    let acceptance = match fields.get("isAcceptance").and_then(Value::as_bool) {
        Some(acceptance) => acceptance,
        None => return Err(shape_error(descriptor)),
    };
    let body = match fields.get("transition").and_then(Value::as_str) {
        Some(body) => body,
        None => return Err(shape_error(descriptor)),
    };

    let program = match TransitionProgram::parse(body) {
        Ok(program) => program,
        Err(EngineError::InvalidProgram { reason }) | Err(EngineError::ProgramFailed { reason }) => {
            tracing::warn!(state = %name, %reason, "transition program failed to compile");
            return Err(shape_error(descriptor));
        }
    };

    Ok(LoadedState {
        name,
        acceptance,
        program,
    })
}
