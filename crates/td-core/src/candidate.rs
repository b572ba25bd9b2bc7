//! Candidate returned by a geo lookup

use serde::{Deserialize, Serialize};

/// A single match from a substring lookup (city, street, house or flat number)
///
/// The identifier is whatever key the remote service uses for the item
/// (a GAID for cities and streets, the number itself for house and flat
/// numbers), always carried as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub identifier: String,
    pub display_name: String,
}

impl Candidate {
    pub fn new(identifier: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
        }
    }
}
