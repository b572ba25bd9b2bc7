//! The outage sensor
//!
//! Polls the outage endpoint for one address and caches the result for
//! the poll interval. Refreshes are serialized: a caller arriving while a
//! refresh is in flight waits for it and then gets the fresh cache.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};
use td_core::{AddressRecord, Clock, EntityId, OutageObservation, State};
use td_geo::{GeoLookup, OutageQuery};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{SensorError, SensorResult};

/// Default poll interval in minutes
pub const DEFAULT_POLL_INTERVAL: u32 = 60;
/// Days of outages queried ahead of now
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Sensor for one configured address
pub struct OutageSensor {
    entity_id: EntityId,
    name: String,
    address: AddressRecord,
    poll_interval: u32,
    window_days: u32,
    lookup: Arc<dyn GeoLookup>,
    clock: Arc<dyn Clock>,
    created_at: DateTime<Utc>,
    /// Last successful observation; `None` until the first one
    observation: Mutex<Option<OutageObservation>>,
}

impl OutageSensor {
    pub fn new(
        address: AddressRecord,
        lookup: Arc<dyn GeoLookup>,
        clock: Arc<dyn Clock>,
    ) -> SensorResult<Self> {
        let name = format!("Tauron outage {}", address.title());
        // display names repeat across cities, identifiers do not
        let entity_id =
            EntityId::from_text("sensor", &format!("tauron_outage {}", address.unique_id()))?;
        let created_at = clock.now();

        Ok(Self {
            entity_id,
            name,
            address,
            poll_interval: DEFAULT_POLL_INTERVAL,
            window_days: DEFAULT_WINDOW_DAYS,
            lookup,
            clock,
            created_at,
            observation: Mutex::new(None),
        })
    }

    /// Poll interval in minutes; must be positive
    pub fn with_poll_interval(mut self, minutes: u32) -> SensorResult<Self> {
        if minutes == 0 {
            return Err(SensorError::InvalidPollInterval);
        }
        self.poll_interval = minutes;
        Ok(self)
    }

    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days.max(1);
        self
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &AddressRecord {
        &self.address
    }

    /// Poll interval in minutes
    pub fn poll_interval(&self) -> u32 {
        self.poll_interval
    }

    /// Poll interval as a timer period
    pub fn period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.poll_interval) * 60)
    }

    /// Current observation, querying the remote only when the cache is stale
    ///
    /// A failed query is logged and the previous observation returned
    /// unchanged, so the next call retries.
    pub async fn refresh(&self) -> OutageObservation {
        let mut cached = self.observation.lock().await;
        let now = self.clock.now();

        if let Some(observation) = cached.as_ref() {
            if !self.is_stale(observation, now) {
                debug!(entity_id = %self.entity_id, "Outage observation still fresh");
                return observation.clone();
            }
        }

        let query = OutageQuery::for_address(&self.address, now, i64::from(self.window_days));
        match self.lookup.outages(&query).await {
            Ok(outages) => {
                let observation = match outages.first() {
                    Some(first) => OutageObservation::new(first.name.clone(), now)
                        .with_window(first.starts_at, first.ends_at)
                        .with_count(outages.len()),
                    None => OutageObservation::no_outage(now),
                };
                if cached.as_ref().map(|c| &c.label) != Some(&observation.label) {
                    info!(entity_id = %self.entity_id, state = %observation.label, "Outage state changed");
                }
                *cached = Some(observation.clone());
                observation
            }
            Err(e) => {
                warn!(entity_id = %self.entity_id, "Outage query failed, keeping previous state: {}", e);
                cached
                    .clone()
                    .unwrap_or_else(|| OutageObservation::unknown(self.created_at))
            }
        }
    }

    /// Stale once the full poll interval has passed
    fn is_stale(&self, observation: &OutageObservation, now: DateTime<Utc>) -> bool {
        now - observation.observed_at >= Duration::minutes(i64::from(self.poll_interval))
    }

    /// Last successful observation without polling
    pub async fn observation(&self) -> Option<OutageObservation> {
        self.observation.lock().await.clone()
    }

    /// Published state for the current observation
    pub async fn state(&self) -> State {
        let observation = self
            .observation()
            .await
            .unwrap_or_else(|| OutageObservation::unknown(self.created_at));
        self.render(&observation)
    }

    /// Render an observation as a published state
    pub fn render(&self, observation: &OutageObservation) -> State {
        let timestamp = |t: Option<DateTime<Utc>>| {
            t.map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true)))
                .unwrap_or(Value::Null)
        };
        let last_observed = (!observation.is_unknown()).then_some(observation.observed_at);

        let attributes: HashMap<String, Value> = [
            ("friendly_name", json!(self.name)),
            ("city_id", json!(self.address.city_id)),
            ("street_id", json!(self.address.street_id)),
            ("house_number", json!(self.address.house_number)),
            ("last_observed", timestamp(last_observed)),
            ("outage_start", timestamp(observation.starts_at)),
            ("outage_end", timestamp(observation.ends_at)),
            ("outage_count", json!(observation.outage_count)),
            ("poll_interval", json!(self.poll_interval)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        State::new(
            self.entity_id.clone(),
            observation.label.clone(),
            attributes,
            self.clock.now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use td_core::{Candidate, MockClock, NO_OUTAGE};
    use td_geo::{LookupQuery, LookupResult, Outage, StaticLookup};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
    }

    fn address() -> AddressRecord {
        AddressRecord {
            city_id: "1".into(),
            city_name: "Kraków".into(),
            street_id: "77".into(),
            street_name: "Floriańska".into(),
            house_number: "12".into(),
            flat_number: "".into(),
        }
    }

    fn maintenance() -> Outage {
        Outage::new("Planned maintenance")
    }

    fn sensor(lookup: Arc<StaticLookup>, clock: &MockClock) -> OutageSensor {
        OutageSensor::new(address(), lookup, Arc::new(clock.clone())).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_respects_interval() {
        let lookup = Arc::new(StaticLookup::new().with_outages(vec![maintenance()]));
        let clock = MockClock::at(t0());
        let sensor = sensor(lookup.clone(), &clock);

        let first = sensor.refresh().await;
        assert_eq!(first.label, "Planned maintenance");
        assert_eq!(first.observed_at, t0());
        assert_eq!(lookup.outage_calls(), 1);

        clock.advance_minutes(10);
        assert_eq!(sensor.refresh().await, first);
        assert_eq!(lookup.outage_calls(), 1);

        clock.set(t0() + Duration::minutes(59));
        assert_eq!(sensor.refresh().await, first);
        assert_eq!(lookup.outage_calls(), 1);

        // a full interval later the cache has expired
        clock.set(t0() + Duration::minutes(60));
        let second = sensor.refresh().await;
        assert_eq!(lookup.outage_calls(), 2);
        assert_eq!(second.observed_at, t0() + Duration::minutes(60));

        clock.set(t0() + Duration::minutes(121));
        sensor.refresh().await;
        assert_eq!(lookup.outage_calls(), 3);
    }

    #[tokio::test]
    async fn test_no_outage_label() {
        let lookup = Arc::new(StaticLookup::new());
        let clock = MockClock::at(t0());
        let sensor = sensor(lookup, &clock);

        let observation = sensor.refresh().await;
        assert_eq!(observation.label, NO_OUTAGE);
        assert!(!observation.is_outage());
    }

    #[tokio::test]
    async fn test_first_outage_wins() {
        let starts = t0() + Duration::days(2);
        let ends = starts + Duration::hours(6);
        let lookup = Arc::new(StaticLookup::new().with_outages(vec![
            Outage::new("Line works").with_window(Some(starts), Some(ends)),
            maintenance(),
        ]));
        let clock = MockClock::at(t0());
        let sensor = sensor(lookup, &clock);

        let observation = sensor.refresh().await;
        assert_eq!(observation.label, "Line works");
        assert_eq!(observation.outage_count, 2);

        let state = sensor.render(&observation);
        assert_eq!(state.state, "Line works");
        assert_eq!(
            state.attribute::<String>("outage_start").as_deref(),
            Some("2026-05-06T09:30:00Z")
        );
        assert_eq!(
            state.attribute::<String>("outage_end").as_deref(),
            Some("2026-05-06T15:30:00Z")
        );
        assert_eq!(state.attribute::<u64>("outage_count"), Some(2));
    }

    #[tokio::test]
    async fn test_query_window() {
        let lookup = Arc::new(StaticLookup::new());
        let clock = MockClock::at(t0());
        let sensor = sensor(lookup.clone(), &clock);

        sensor.refresh().await;
        let query = lookup.last_outage_query().unwrap();
        assert_eq!(query.city_id, "1");
        assert_eq!(query.street_id, "77");
        assert_eq!(query.house_number, "12");
        assert_eq!(query.from, t0());
        assert_eq!(query.to, t0() + Duration::days(7));
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_observation() {
        let lookup = Arc::new(StaticLookup::new().with_outages(vec![maintenance()]));
        let clock = MockClock::at(t0());
        let sensor = sensor(lookup.clone(), &clock);

        let first = sensor.refresh().await;

        clock.advance_minutes(61);
        lookup.set_failing(true);
        let stale = sensor.refresh().await;
        assert_eq!(stale, first);
        assert_eq!(lookup.outage_calls(), 2);

        // the timestamp did not advance, so the next call retries at once
        lookup.set_failing(false);
        lookup.set_outages(vec![]);
        let recovered = sensor.refresh().await;
        assert_eq!(lookup.outage_calls(), 3);
        assert_eq!(recovered.label, NO_OUTAGE);
        assert_eq!(recovered.observed_at, t0() + Duration::minutes(61));
    }

    #[tokio::test]
    async fn test_failure_before_first_success_is_unknown() {
        let lookup = Arc::new(StaticLookup::new());
        lookup.set_failing(true);
        let clock = MockClock::at(t0());
        let sensor = sensor(lookup.clone(), &clock);

        let observation = sensor.refresh().await;
        assert!(observation.is_unknown());
        assert!(sensor.observation().await.is_none());

        let state = sensor.state().await;
        assert!(state.is_unknown());
        assert_eq!(state.attributes.get("last_observed"), Some(&Value::Null));

        sensor.refresh().await;
        assert_eq!(lookup.outage_calls(), 2);
    }

    #[tokio::test]
    async fn test_state_attributes() {
        let lookup = Arc::new(StaticLookup::new());
        let clock = MockClock::at(t0());
        let sensor = sensor(lookup, &clock);
        sensor.refresh().await;

        let state = sensor.state().await;
        assert_eq!(
            state.entity_id.to_string(),
            "sensor.tauron_outage_1_77_12"
        );
        assert_eq!(
            state.attribute::<String>("friendly_name").as_deref(),
            Some("Tauron outage Kraków, Floriańska 12")
        );
        assert_eq!(state.state, NO_OUTAGE);
        assert_eq!(state.attribute::<String>("city_id").as_deref(), Some("1"));
        assert_eq!(state.attribute::<String>("street_id").as_deref(), Some("77"));
        assert_eq!(state.attribute::<String>("house_number").as_deref(), Some("12"));
        assert_eq!(
            state.attribute::<String>("last_observed").as_deref(),
            Some("2026-05-04T09:30:00Z")
        );
        assert_eq!(state.attributes.get("outage_start"), Some(&Value::Null));
        assert_eq!(state.attribute::<u64>("outage_count"), Some(0));
    }

    #[test]
    fn test_same_names_different_ids_get_distinct_entities() {
        let clock = Arc::new(MockClock::at(t0()));
        let nowa_wies = |city_id: &str| AddressRecord {
            city_id: city_id.into(),
            city_name: "Nowa Wieś".into(),
            street_id: "5".into(),
            street_name: "Polna".into(),
            house_number: "1".into(),
            flat_number: "".into(),
        };

        let a = OutageSensor::new(nowa_wies("10"), Arc::new(StaticLookup::new()), clock.clone())
            .unwrap();
        let b = OutageSensor::new(nowa_wies("11"), Arc::new(StaticLookup::new()), clock).unwrap();

        assert_eq!(a.name(), b.name());
        assert_ne!(a.entity_id(), b.entity_id());
        assert_eq!(a.entity_id().to_string(), "sensor.tauron_outage_10_5_1");
    }

    #[tokio::test]
    async fn test_zero_poll_interval_rejected() {
        let clock = MockClock::at(t0());
        let result = sensor(Arc::new(StaticLookup::new()), &clock).with_poll_interval(0);
        assert!(matches!(result, Err(SensorError::InvalidPollInterval)));
    }

    /// Outage lookup that yields before answering
    struct SlowLookup(StaticLookup);

    #[async_trait]
    impl GeoLookup for SlowLookup {
        async fn query(&self, query: &LookupQuery) -> LookupResult<Vec<Candidate>> {
            self.0.query(query).await
        }

        async fn outages(&self, query: &OutageQuery) -> LookupResult<Vec<Outage>> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.0.outages(query).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_query() {
        let lookup = Arc::new(SlowLookup(
            StaticLookup::new().with_outages(vec![maintenance()]),
        ));
        let clock = MockClock::at(t0());
        let sensor = OutageSensor::new(address(), lookup.clone(), Arc::new(clock)).unwrap();

        let results = futures::future::join_all((0..5).map(|_| sensor.refresh())).await;

        assert_eq!(lookup.0.outage_calls(), 1);
        assert!(results.iter().all(|r| r.label == "Planned maintenance"));
    }
}
