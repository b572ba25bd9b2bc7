//! reqwest-backed lookup client

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use td_core::{Candidate, Stage};
use tracing::{debug, trace, warn};

use crate::error::{LookupError, LookupResult};
use crate::query::{LookupQuery, Outage, OutageQuery, DEFAULT_MIN_QUERY_LENGTH};
use crate::GeoLookup;

/// Production API root
pub const DEFAULT_BASE_URL: &str = "https://www.tauron-dystrybucja.pl/waapi";

/// Endpoint paths relative to the base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub cities: String,
    pub streets: String,
    pub house_numbers: String,
    pub flat_numbers: String,
    pub outages: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            cities: "/enum/geo/cities".to_string(),
            streets: "/enum/geo/streets".to_string(),
            house_numbers: "/enum/geo/housenumbers".to_string(),
            flat_numbers: "/enum/geo/flatnumbers".to_string(),
            outages: "/outages/address".to_string(),
        }
    }
}

impl Endpoints {
    fn for_stage(&self, stage: Stage) -> &str {
        match stage {
            Stage::City => &self.cities,
            Stage::Street => &self.streets,
            Stage::HouseNumber => &self.house_numbers,
            Stage::FlatNumber => &self.flat_numbers,
        }
    }
}

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub endpoints: Endpoints,
    pub timeout: Duration,
    pub min_query_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoints: Endpoints::default(),
            timeout: Duration::from_secs(10),
            min_query_length: DEFAULT_MIN_QUERY_LENGTH,
        }
    }
}

/// Tauron Dystrybucja `waapi` client
#[derive(Clone)]
pub struct TauronClient {
    client: Client,
    base_url: String,
    endpoints: Endpoints,
    min_query_length: usize,
}

impl TauronClient {
    pub fn new(config: ClientConfig) -> LookupResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LookupError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoints: config.endpoints,
            min_query_length: config.min_query_length,
        })
    }

    /// Client against a custom base URL with default settings
    pub fn with_base_url(base_url: impl Into<String>) -> LookupResult<Self> {
        Self::new(ClientConfig {
            base_url: base_url.into(),
            ..ClientConfig::default()
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> LookupResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|source| LookupError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| LookupError::Transport {
                url: url.clone(),
                source,
            })?;
        trace!("Response from {}: {}", url, body);

        serde_json::from_str(&body).map_err(|e| LookupError::Malformed {
            url,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl GeoLookup for TauronClient {
    async fn query(&self, query: &LookupQuery) -> LookupResult<Vec<Candidate>> {
        if !query.is_searchable(self.min_query_length) {
            debug!(
                "Skipping {} lookup for short input {:?}",
                query.stage, query.part_name
            );
            return Ok(Vec::new());
        }

        let mut params = vec![("partName", query.part_name.trim().to_string())];
        match query.stage {
            Stage::City => {}
            Stage::Street => {
                params.extend(query.city_id.clone().map(|id| ("ownerGAID", id)));
            }
            Stage::HouseNumber | Stage::FlatNumber => {
                params.extend(query.city_id.clone().map(|id| ("cityGAID", id)));
                params.extend(query.street_id.clone().map(|id| ("streetGAID", id)));
                params.extend(query.house_number.clone().map(|no| ("houseNo", no)));
            }
        }

        let result = self
            .get_json::<Vec<GeoItem>>(self.endpoints.for_stage(query.stage), &params)
            .await;

        match result {
            Ok(items) => {
                let candidates: Vec<Candidate> = items
                    .into_iter()
                    .filter_map(|item| item.into_candidate(query.stage))
                    .collect();
                debug!(
                    "{} lookup for {:?} returned {} candidates",
                    query.stage,
                    query.part_name,
                    candidates.len()
                );
                Ok(candidates)
            }
            Err(e) => {
                warn!("{} lookup failed: {}", query.stage, e);
                Err(e)
            }
        }
    }

    async fn outages(&self, query: &OutageQuery) -> LookupResult<Vec<Outage>> {
        let params = [
            ("cityGAID", query.city_id.clone()),
            ("streetGAID", query.street_id.clone()),
            ("houseNo", query.house_number.clone()),
            ("fromDate", format_date(query.from)),
            ("toDate", format_date(query.to)),
            ("getLightingSupport", "true".to_string()),
            ("getServicedSwitchingoff", "true".to_string()),
        ];

        match self
            .get_json::<Vec<OutageItem>>(&self.endpoints.outages, &params)
            .await
        {
            Ok(items) => Ok(items.into_iter().map(OutageItem::into_outage).collect()),
            Err(e) => {
                warn!("Outage query failed: {}", e);
                Err(e)
            }
        }
    }
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse remote timestamps, which may lack an offset (taken as UTC)
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Item of a geo enumeration response
#[derive(Debug, Deserialize)]
struct GeoItem {
    #[serde(rename = "GAID")]
    gaid: Option<Value>,
    #[serde(rename = "GUS")]
    gus: Option<Value>,
    #[serde(rename = "HouseNumber")]
    house_number: Option<Value>,
    #[serde(rename = "FlatNumber")]
    flat_number: Option<Value>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "FullName")]
    full_name: Option<String>,
}

impl GeoItem {
    fn into_candidate(self, stage: Stage) -> Option<Candidate> {
        let identifier = match stage {
            Stage::City | Stage::Street => key_string(self.gaid).or_else(|| key_string(self.gus)),
            Stage::HouseNumber => key_string(self.house_number),
            Stage::FlatNumber => key_string(self.flat_number),
        }
        .or_else(|| match stage {
            Stage::HouseNumber | Stage::FlatNumber => self.name.clone(),
            _ => None,
        });

        let Some(identifier) = identifier else {
            debug!("Dropping {} item without identifier", stage);
            return None;
        };

        let display_name = self
            .full_name
            .or(self.name)
            .unwrap_or_else(|| identifier.clone());

        Some(Candidate {
            identifier,
            display_name,
        })
    }
}

fn key_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Item of an outage response
#[derive(Debug, Deserialize)]
struct OutageItem {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "StartDate")]
    start_date: Option<String>,
    #[serde(rename = "EndDate")]
    end_date: Option<String>,
}

impl OutageItem {
    fn into_outage(self) -> Outage {
        Outage {
            name: self
                .name
                .or(self.message)
                .unwrap_or_else(|| "Outage".to_string()),
            starts_at: self.start_date.as_deref().and_then(parse_date),
            ends_at: self.end_date.as_deref().and_then(parse_date),
        }
    }
}
