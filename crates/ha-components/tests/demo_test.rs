//! The demo integration end to end: hub, coordinator, entities, state store

use std::sync::Arc;
use std::time::Duration;

use ha_components::demo::{self, DEVICE_LOCK, DEVICE_SENSOR};
use ha_config::IntegrationConfig;
use ha_coordinator::{SetupError, UpdateError};
use ha_core::{EntityId, STATE_LOCKED, STATE_UNAVAILABLE, STATE_UNLOCKED};
use ha_entity::CommandError;
use ha_state_store::StateStore;
use serde_json::json;

fn demo_config() -> IntegrationConfig {
    let mut config = IntegrationConfig::new("demo");
    config.name = "Demo Hub".to_string();
    config
}

fn id(entity_id: &str) -> EntityId {
    entity_id.parse().unwrap()
}

async fn setup(config: &IntegrationConfig) -> (demo::DemoEntry, Arc<StateStore>) {
    let store = Arc::new(StateStore::new());
    let entry = demo::async_setup_entry(config, store.clone()).await.unwrap();
    (entry, store)
}

#[tokio::test]
async fn test_setup_publishes_every_entity() {
    let (entry, store) = setup(&demo_config()).await;

    assert_eq!(entry.platform().len(), 5);
    assert_eq!(store.get_state("lock.front_door").as_deref(), Some(STATE_LOCKED));
    assert_eq!(store.get_state("climate.hallway").as_deref(), Some("heat"));
    assert_eq!(store.get_state("light.living_room").as_deref(), Some("off"));
    assert_eq!(store.get_state("sensor.outside_temperature").as_deref(), Some("12.3"));
    assert_eq!(store.get_state("sensor.outside_humidity").as_deref(), Some("64"));

    let lock = store.get("lock.front_door").unwrap();
    assert_eq!(lock.attribute::<String>("friendly_name").as_deref(), Some("Front Door"));
    assert_eq!(lock.attribute::<u64>("battery_level"), Some(87));

    let climate = store.get("climate.hallway").unwrap();
    assert_eq!(climate.attribute::<f64>("temperature"), Some(21.0));
    assert_eq!(climate.attribute::<f64>("current_temperature"), Some(20.0));

    entry.unload().await;
}

#[tokio::test]
async fn test_unlock_shows_after_refresh() {
    let (entry, store) = setup(&demo_config()).await;

    entry
        .call_service(&id("lock.front_door"), "unlock", &json!({}))
        .await
        .unwrap();
    assert_eq!(store.get_state("lock.front_door").as_deref(), Some(STATE_UNLOCKED));
    assert_eq!(entry.hub().device(DEVICE_LOCK).unwrap()["locked"], json!(false));

    entry.unload().await;
}

#[tokio::test(start_paused = true)]
async fn test_commands_within_cooldown_share_a_trailing_refresh() {
    let (entry, store) = setup(&demo_config()).await;
    let lock = id("lock.front_door");

    entry.call_service(&lock, "unlock", &json!({})).await.unwrap();
    assert_eq!(store.get_state("lock.front_door").as_deref(), Some(STATE_UNLOCKED));

    entry.call_service(&lock, "lock", &json!({})).await.unwrap();
    assert_eq!(entry.hub().device(DEVICE_LOCK).unwrap()["locked"], json!(true));
    assert_eq!(store.get_state("lock.front_door").as_deref(), Some(STATE_UNLOCKED));

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(store.get_state("lock.front_door").as_deref(), Some(STATE_LOCKED));

    entry.unload().await;
}

#[tokio::test]
async fn test_set_temperature_updates_attribute() {
    let (entry, store) = setup(&demo_config()).await;

    entry
        .call_service(&id("climate.hallway"), "set_temperature", &json!({"temperature": 18.0}))
        .await
        .unwrap();
    let climate = store.get("climate.hallway").unwrap();
    assert_eq!(climate.attribute::<f64>("temperature"), Some(18.0));

    let err = entry
        .call_service(&id("climate.hallway"), "set_temperature", &json!({"temperature": 50.0}))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::InvalidArgument(_)));

    entry.unload().await;
}

#[tokio::test]
async fn test_unsupported_command_rejected_before_hub() {
    let (entry, store) = setup(&demo_config()).await;
    let fetches = entry.hub().fetches();

    let err = entry
        .call_service(&id("sensor.outside_temperature"), "turn_on", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NotSupported { .. }));
    assert_eq!(entry.hub().fetches(), fetches);
    assert_eq!(store.get_state("sensor.outside_temperature").as_deref(), Some("12.3"));

    let err = entry
        .call_service(&id("lock.back_door"), "lock", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::InvalidArgument(_)));

    entry.unload().await;
}

#[tokio::test]
async fn test_vendor_command_error_returned_unchanged() {
    let (entry, _store) = setup(&demo_config()).await;
    entry
        .hub()
        .fail_next_command(CommandError::unreachable("hub rebooting"));

    let err = entry
        .call_service(&id("light.living_room"), "turn_on", &json!({"brightness": 40}))
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::unreachable("hub rebooting"));

    entry.unload().await;
}

#[tokio::test]
async fn test_unreachable_hub_not_ready() {
    let mut config = demo_config();
    config.options.insert("unreachable".to_string(), json!(true));
    let store = Arc::new(StateStore::new());

    let err = demo::async_setup_entry(&config, store.clone()).await.err().unwrap();
    assert!(matches!(err, SetupError::NotReady { .. }));
    assert_eq!(store.entity_count(), 0);
}

#[tokio::test]
async fn test_rejected_credentials_fail_setup() {
    let mut config = demo_config();
    config.options.insert("reject_credentials".to_string(), json!(true));
    let store = Arc::new(StateStore::new());

    let err = demo::async_setup_entry(&config, store).await.err().unwrap();
    assert!(matches!(err, SetupError::AuthFailed { .. }));
    assert!(err.update_error().is_some_and(UpdateError::is_auth_failure));
}

#[tokio::test]
async fn test_devices_option_limits_entities() {
    let mut config = demo_config();
    config.options.insert("devices".to_string(), json!([DEVICE_SENSOR]));
    let (entry, store) = setup(&config).await;

    assert_eq!(entry.platform().len(), 2);
    assert_eq!(store.entity_count(), 2);
    assert!(store.get("lock.front_door").is_none());

    entry.unload().await;
}

#[tokio::test]
async fn test_failed_refresh_marks_entities_unavailable() {
    let (entry, store) = setup(&demo_config()).await;

    entry.hub().fail_next(UpdateError::Timeout);
    entry.coordinator().request_refresh().await;
    assert_eq!(store.get_state("lock.front_door").as_deref(), Some(STATE_UNAVAILABLE));
    assert_eq!(entry.platform().len(), 5);

    entry.coordinator().request_refresh().await;
    assert_eq!(store.get_state("lock.front_door").as_deref(), Some(STATE_LOCKED));

    entry.unload().await;
}

#[tokio::test]
async fn test_unload_removes_states_and_closes_hub() {
    let (entry, store) = setup(&demo_config()).await;
    assert_eq!(store.entity_count(), 5);
    let coordinator = entry.coordinator().clone();

    entry.unload().await;
    assert_eq!(store.entity_count(), 0);
    assert!(coordinator.is_torn_down());
    assert!(coordinator.client().is_closed());
    assert_eq!(coordinator.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_polling_follows_thermostat() {
    let mut config = demo_config();
    config.scan_interval = Duration::from_secs(10);
    let (entry, store) = setup(&config).await;
    let reading = |store: &Arc<StateStore>| {
        store
            .get("climate.hallway")
            .and_then(|s| s.attribute::<f64>("current_temperature"))
    };
    assert_eq!(reading(&store), Some(20.0));

    let mut rx = entry.coordinator().subscribe();
    rx.borrow_and_update();
    rx.changed().await.unwrap();
    assert_eq!(reading(&store), Some(20.5));

    rx.changed().await.unwrap();
    assert_eq!(reading(&store), Some(21.0));
    assert_eq!(entry.hub().fetches(), 3);

    entry.unload().await;
}
