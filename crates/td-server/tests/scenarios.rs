//! End-to-end scenarios against a mocked `waapi` service

use chrono::{Duration, TimeZone, Utc};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use td_config::{IntegrationConfig, ServiceConfig};
use td_core::{MockClock, DOMAIN};
use td_flow::FlowResult;
use td_geo::TauronClient;
use td_server::{client_config, TauronOutage};
use tempfile::TempDir;

async fn service(server: &ServerGuard, dir: &TempDir, clock: &MockClock) -> TauronOutage {
    let config = ServiceConfig {
        integration: IntegrationConfig {
            base_url: server.url(),
            ..IntegrationConfig::default()
        },
        ..ServiceConfig::default()
    };
    let lookup = TauronClient::new(client_config(&config.integration)).unwrap();
    TauronOutage::new(dir.path(), config, Arc::new(lookup), Arc::new(clock.clone()))
        .await
        .unwrap()
}

async fn geo_mock(
    server: &mut ServerGuard,
    path: &str,
    query: Vec<(&str, &str)>,
    body: Value,
) -> Mock {
    let matchers = query
        .into_iter()
        .map(|(k, v)| Matcher::UrlEncoded(k.into(), v.into()))
        .collect();
    server
        .mock("GET", path)
        .match_query(Matcher::AllOf(matchers))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

async fn submit(service: &TauronOutage, flow_id: &str, input: Value) -> FlowResult {
    service
        .flows
        .progress_flow(flow_id, Some(input))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_city_selection_moves_to_street() {
    let mut server = Server::new_async().await;
    let cities = geo_mock(
        &mut server,
        "/enum/geo/cities",
        vec![("partName", "Krak")],
        json!([{"GAID": 1, "Name": "Kraków"}]),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, &MockClock::new()).await;

    let form = service.flows.start_flow(DOMAIN).await.unwrap();
    let flow_id = form.flow_id.clone();

    let form = submit(&service, &flow_id, json!({"city": "Krak"})).await;
    assert_eq!(form.step_id.as_deref(), Some("city"));
    assert_eq!(form.choices(), vec!["1"]);

    let form = submit(&service, &flow_id, json!({"selection": "1"})).await;
    assert_eq!(form.step_id.as_deref(), Some("street"));
    assert!(form.errors.is_none());
    assert_eq!(
        form.description_placeholders.unwrap().get("city").map(String::as_str),
        Some("Kraków")
    );
    cities.assert_async().await;
}

#[tokio::test]
async fn test_short_city_makes_no_request() {
    let mut server = Server::new_async().await;
    let cities = server
        .mock("GET", "/enum/geo/cities")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, &MockClock::new()).await;

    let flow_id = service.flows.start_flow(DOMAIN).await.unwrap().flow_id;
    let form = submit(&service, &flow_id, json!({"city": " Kr "})).await;

    assert_eq!(form.error("city"), Some("too_short"));
    cities.assert_async().await;
}

#[tokio::test]
async fn test_full_flow_without_flat_number() {
    let mut server = Server::new_async().await;
    geo_mock(
        &mut server,
        "/enum/geo/cities",
        vec![("partName", "Krak")],
        json!([{"GAID": 1, "Name": "Kraków"}]),
    )
    .await;
    // an empty answer keeps the city and reports the street
    let no_streets = geo_mock(
        &mut server,
        "/enum/geo/streets",
        vec![("partName", "Flor"), ("ownerGAID", "1")],
        json!([]),
    )
    .await;
    let streets = geo_mock(
        &mut server,
        "/enum/geo/streets",
        vec![("partName", "Florian"), ("ownerGAID", "1")],
        json!([{"GAID": 77, "Name": "Floriańska"}]),
    )
    .await;
    let houses = geo_mock(
        &mut server,
        "/enum/geo/housenumbers",
        vec![("partName", "12"), ("cityGAID", "1"), ("streetGAID", "77")],
        json!([{"HouseNumber": "12", "Name": "12"}]),
    )
    .await;
    let flats = server
        .mock("GET", "/enum/geo/flatnumbers")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, &MockClock::new()).await;
    let flow_id = service.flows.start_flow(DOMAIN).await.unwrap().flow_id;

    submit(&service, &flow_id, json!({"city": "Krak"})).await;
    submit(&service, &flow_id, json!({"selection": "1"})).await;

    let form = submit(&service, &flow_id, json!({"street": "Flor"})).await;
    assert_eq!(form.step_id.as_deref(), Some("street"));
    assert_eq!(form.error("street"), Some("invalid_street"));
    no_streets.assert_async().await;

    // the retry is still scoped to city 1
    let form = submit(&service, &flow_id, json!({"street": "Florian"})).await;
    assert_eq!(form.choices(), vec!["77"]);
    streets.assert_async().await;

    submit(&service, &flow_id, json!({"selection": "77"})).await;
    submit(&service, &flow_id, json!({"house_number": "12"})).await;
    let form = submit(&service, &flow_id, json!({"selection": "12"})).await;
    assert_eq!(form.step_id.as_deref(), Some("flat_number"));
    houses.assert_async().await;

    let done = submit(&service, &flow_id, json!({"flat_number": ""})).await;
    assert!(done.is_create_entry());
    assert_eq!(done.title.as_deref(), Some("Kraków, Floriańska 12"));
    flats.assert_async().await;

    let entry = service
        .config_entries
        .get(done.entry_id().unwrap())
        .unwrap();
    assert_eq!(entry.unique_id.as_deref(), Some("1_77_12_"));
    assert_eq!(entry.poll_interval(), Some(60));
    let record = entry.address().unwrap();
    assert_eq!(record.city_id, "1");
    assert_eq!(record.city_name, "Kraków");
    assert_eq!(record.street_id, "77");
    assert_eq!(record.street_name, "Floriańska");
    assert_eq!(record.house_number, "12");
    assert_eq!(record.flat_number, "");

    // the same address a second time is refused
    let again = service.flows.start_flow(DOMAIN).await.unwrap().flow_id;
    for input in [
        json!({"city": "Krak"}),
        json!({"selection": "1"}),
        json!({"street": "Florian"}),
        json!({"selection": "77"}),
        json!({"house_number": "12"}),
        json!({"selection": "12"}),
    ] {
        submit(&service, &again, input).await;
    }
    let aborted = submit(&service, &again, json!({"flat_number": ""})).await;
    assert!(aborted.is_abort());
    assert_eq!(aborted.reason.as_deref(), Some("already_configured"));
    assert_eq!(service.config_entries.len(), 1);
}

#[tokio::test]
async fn test_outage_refresh_respects_interval() {
    let mut server = Server::new_async().await;
    let outages = server
        .mock("GET", "/outages/address")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("cityGAID".into(), "1".into()),
            Matcher::UrlEncoded("streetGAID".into(), "77".into()),
            Matcher::UrlEncoded("houseNo".into(), "12".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([{"Name": "Planned maintenance"}]).to_string())
        .expect(2)
        .create_async()
        .await;

    let t0 = Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap();
    let clock = MockClock::at(t0);
    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, &clock).await;

    let record = td_core::AddressRecord {
        city_id: "1".into(),
        city_name: "Kraków".into(),
        street_id: "77".into(),
        street_name: "Floriańska".into(),
        house_number: "12".into(),
        flat_number: "".into(),
    };
    let mut entry = td_config_entries::ConfigEntry::for_address(&record).with_poll_interval(60);
    // refreshes are driven by hand below
    entry.pref_disable_polling = true;
    let entry = service.config_entries.add(entry).await.unwrap();
    service.sensors.setup_entry(&entry).await.unwrap();

    let first = service.sensors.refresh_entry(&entry.entry_id).await.unwrap();
    assert_eq!(first.state, "Planned maintenance");

    clock.advance_minutes(10);
    let second = service.sensors.refresh_entry(&entry.entry_id).await.unwrap();
    assert_eq!(second.state, "Planned maintenance");
    assert_eq!(
        second.attribute::<String>("last_observed"),
        first.attribute::<String>("last_observed")
    );

    clock.set(t0 + Duration::minutes(61));
    let third = service.sensors.refresh_entry(&entry.entry_id).await.unwrap();
    assert_eq!(
        third.attribute::<String>("last_observed").as_deref(),
        Some("2026-05-04T10:31:00Z")
    );
    outages.assert_async().await;

    let published = service.states.get(&first.entity_id.to_string()).unwrap();
    assert_eq!(published.state, "Planned maintenance");
    // the state never changed, so neither did last_changed
    assert_eq!(published.last_changed, first.last_changed);
}

#[tokio::test]
async fn test_entries_survive_restart() {
    let server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let clock = MockClock::new();

    let record = td_core::AddressRecord {
        city_id: "1".into(),
        city_name: "Kraków".into(),
        street_id: "77".into(),
        street_name: "Floriańska".into(),
        house_number: "12".into(),
        flat_number: "3".into(),
    };
    {
        let first = service(&server, &dir, &clock).await;
        let mut entry = td_config_entries::ConfigEntry::for_address(&record);
        entry.pref_disable_polling = true;
        first.config_entries.add(entry).await.unwrap();
    }

    let restarted = service(&server, &dir, &clock).await;
    assert_eq!(restarted.config_entries.len(), 1);
    assert_eq!(restarted.setup_entries().await, 1);
    assert_eq!(
        restarted.states.entity_ids("sensor"),
        vec!["sensor.tauron_outage_1_77_12_3".to_string()]
    );
    restarted.shutdown().await;
}
