//! In-memory lookup
//!
//! Serves canned candidates and outages and counts how often the network
//! would have been hit. Used by the flow, sensor and API tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use td_core::{Candidate, Stage};

use crate::error::{LookupError, LookupResult};
use crate::query::{LookupQuery, Outage, OutageQuery, DEFAULT_MIN_QUERY_LENGTH};
use crate::GeoLookup;

#[derive(Default)]
struct Canned {
    candidates: HashMap<(Stage, String), Vec<Candidate>>,
    outages: Vec<Outage>,
    last_outage_query: Option<OutageQuery>,
}

/// Lookup backed by canned responses
///
/// Candidates are keyed by stage and the lowercased, trimmed partial name;
/// unknown keys answer with an empty list.
pub struct StaticLookup {
    canned: Mutex<Canned>,
    failing: AtomicBool,
    min_query_length: usize,
    calls: AtomicUsize,
    outage_calls: AtomicUsize,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self {
            canned: Mutex::new(Canned::default()),
            failing: AtomicBool::new(false),
            min_query_length: DEFAULT_MIN_QUERY_LENGTH,
            calls: AtomicUsize::new(0),
            outage_calls: AtomicUsize::new(0),
        }
    }

    /// Add the answer for a stage lookup
    pub fn with_candidates(self, stage: Stage, part_name: &str, candidates: Vec<Candidate>) -> Self {
        self.set_candidates(stage, part_name, candidates);
        self
    }

    pub fn with_outages(self, outages: Vec<Outage>) -> Self {
        self.set_outages(outages);
        self
    }

    pub fn set_candidates(&self, stage: Stage, part_name: &str, candidates: Vec<Candidate>) {
        self.with_canned(|canned| {
            canned
                .candidates
                .insert((stage, normalize(part_name)), candidates);
        });
    }

    pub fn set_outages(&self, outages: Vec<Outage>) {
        self.with_canned(|canned| canned.outages = outages);
    }

    /// Make every lookup fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stage lookups that reached the "network"
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of outage queries that reached the "network"
    pub fn outage_calls(&self) -> usize {
        self.outage_calls.load(Ordering::SeqCst)
    }

    pub fn last_outage_query(&self) -> Option<OutageQuery> {
        self.with_canned(|canned| canned.last_outage_query.clone())
    }

    fn with_canned<R>(&self, f: impl FnOnce(&mut Canned) -> R) -> R {
        let mut guard = match self.canned.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn check_failing(&self) -> LookupResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(LookupError::Unavailable("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for StaticLookup {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(part_name: &str) -> String {
    part_name.trim().to_lowercase()
}

#[async_trait]
impl GeoLookup for StaticLookup {
    async fn query(&self, query: &LookupQuery) -> LookupResult<Vec<Candidate>> {
        if !query.is_searchable(self.min_query_length) {
            return Ok(Vec::new());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;

        let key = (query.stage, normalize(&query.part_name));
        Ok(self.with_canned(|canned| canned.candidates.get(&key).cloned().unwrap_or_default()))
    }

    async fn outages(&self, query: &OutageQuery) -> LookupResult<Vec<Outage>> {
        self.outage_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;

        Ok(self.with_canned(|canned| {
            canned.last_outage_query = Some(query.clone());
            canned.outages.clone()
        }))
    }
}
