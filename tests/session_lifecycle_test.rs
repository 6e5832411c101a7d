use chrono::Duration;
use course_session::clock::{Clock, ManualClock};
use course_session::registry::{DeviceId, DeviceRegistry, REGISTRY_KEY, RegistryTable};
use course_session::session::{
    ActivityKind, ChannelObserver, ExpiryReason, SessionConfig, SessionController, SessionEvent,
    SessionPhase, TimerKind, session_key,
};
use course_session::storage::{FileStore, KeyValueStore, MemoryStore};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// One app instance: a device registry plus its controller over a shared store
struct Device {
    clock: ManualClock,
    registry: Arc<DeviceRegistry>,
    controller: SessionController,
    events: UnboundedReceiver<SessionEvent>,
}

impl Device {
    fn new(store: Arc<dyn KeyValueStore>, clock: ManualClock, device_id: &str) -> Self {
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let registry = Arc::new(DeviceRegistry::with_device_id(
            store.clone(),
            shared_clock.clone(),
            DeviceId::from(device_id),
        ));
        let (observer, events) = ChannelObserver::new();
        let controller = SessionController::new(
            registry.clone(),
            store,
            shared_clock,
            Arc::new(observer),
            SessionConfig::default(),
        );
        Self {
            clock,
            registry,
            controller,
            events,
        }
    }

    async fn sign_in(&mut self, username: &str) -> bool {
        self.registry.login(username).await && self.controller.login().await
    }

    async fn at(&mut self, ms: i64) {
        self.clock.set_millis(ms);
        self.controller.poll().await;
    }

    fn events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn memory_store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

/// Login at t=0, warning at 25 minutes with 5 minutes left, expiry at 30 minutes
#[tokio::test]
async fn test_idle_session_warns_then_expires() {
    let mut device = Device::new(memory_store(), ManualClock::at_millis(0), "device_a");
    assert!(device.sign_in("alice").await);

    let state = device.controller.current_session().await.unwrap();
    assert_eq!(state.expires_at.timestamp_millis(), 1_800_000);

    device.at(1_500_000).await;
    assert_eq!(device.controller.snapshot().phase(), SessionPhase::Warning);
    assert_eq!(
        device.events(),
        vec![SessionEvent::Warning {
            remaining: Duration::milliseconds(300_000)
        }]
    );

    device.at(1_800_000).await;
    assert_eq!(device.controller.snapshot().phase(), SessionPhase::Unauthenticated);
    assert_eq!(
        device.events(),
        vec![SessionEvent::Expired {
            reason: ExpiryReason::IdleTimeout
        }]
    );
}

/// Activity at t=1 000 000 moves expiry to 2 800 000 and the warning to 2 500 000
#[tokio::test]
async fn test_activity_moves_warning() {
    let mut device = Device::new(memory_store(), ManualClock::at_millis(0), "device_a");
    device.sign_in("alice").await;

    device.at(1_000_000).await;
    device
        .controller
        .record_activity(ActivityKind::PointerMove)
        .await;

    let state = device.controller.current_session().await.unwrap();
    assert_eq!(state.expires_at.timestamp_millis(), 2_800_000);
    assert_eq!(
        device
            .controller
            .timers()
            .deadline(TimerKind::Warning)
            .map(|at| at.timestamp_millis()),
        Some(2_500_000)
    );

    device.at(1_800_000).await;
    assert!(device.controller.is_authenticated());

    device.at(2_499_999).await;
    assert!(!device.controller.show_warning());

    device.at(2_500_000).await;
    assert!(device.controller.show_warning());
    assert_eq!(
        device.events(),
        vec![SessionEvent::Warning {
            remaining: Duration::milliseconds(300_000)
        }]
    );
}

/// A second device cannot take over a username that is bound elsewhere
#[tokio::test]
async fn test_cross_device_exclusion() {
    let store = memory_store();
    let clock = ManualClock::at_millis(0);
    let mut laptop = Device::new(store.clone(), clock.clone(), "device_laptop");
    let mut phone = Device::new(store.clone(), clock.clone(), "device_phone");

    assert!(laptop.sign_in("alice").await);
    assert!(!phone.sign_in("alice").await);
    assert!(!phone.controller.is_authenticated());
    assert!(phone.registry.is_user_logged_in_elsewhere("alice").await);

    // Foreign logout leaves the laptop's binding alone
    phone.registry.logout("alice").await;
    let record = laptop.registry.get_record("alice").await.unwrap();
    assert_eq!(record.device_id.as_str(), "device_laptop");

    // Once the laptop logs out the phone may sign in
    laptop.controller.logout().await;
    assert!(phone.sign_in("alice").await);

    let raw = store.get(REGISTRY_KEY).await.unwrap().unwrap();
    let table = RegistryTable::decode(&raw);
    assert_eq!(table.len(), 1);
    assert_eq!(
        table.get("alice").unwrap().device_id.as_str(),
        "device_phone"
    );
}

/// Process restart at t=500 000 restores the session with its persisted deadlines
#[tokio::test]
async fn test_restart_restores_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&path));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_millis(0));
        let registry = DeviceRegistry::open(store.clone(), clock).await;
        assert!(registry.login("alice").await);

        let mut device = Device::new(
            store,
            ManualClock::at_millis(0),
            registry.current_device_id().as_str(),
        );
        assert!(device.controller.login().await);
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&path));
    let clock = ManualClock::at_millis(500_000);
    let reopened = DeviceRegistry::open(store.clone(), Arc::new(clock.clone())).await;
    let mut device = Device::new(store.clone(), clock, reopened.current_device_id().as_str());

    device.controller.restore().await;

    assert!(device.controller.is_authenticated());
    assert_eq!(device.controller.current_user(), Some("alice"));
    let timers = device.controller.timers();
    assert_eq!(
        timers.deadline(TimerKind::Warning).map(|at| at.timestamp_millis()),
        Some(1_500_000)
    );
    assert_eq!(
        timers.deadline(TimerKind::Expiry).map(|at| at.timestamp_millis()),
        Some(1_800_000)
    );

    device.at(1_500_000).await;
    assert!(device.controller.show_warning());
}

/// Past the hard deadline nothing can keep a session alive
#[tokio::test]
async fn test_hard_deadline_overrides_session() {
    let deadline = SessionConfig::default().hard_expiry_deadline.timestamp_millis();
    let store = memory_store();
    let mut device = Device::new(store.clone(), ManualClock::at_millis(deadline - 120_000), "device_a");
    assert!(device.sign_in("alice").await);

    device.clock.set_millis(deadline + 1);
    device.controller.record_activity(ActivityKind::Click).await;

    assert!(!device.controller.is_authenticated());
    assert!(store.get(&session_key("alice")).await.unwrap().is_none());
    assert!(device.registry.get_record("alice").await.is_none());
    assert_eq!(
        device.events(),
        vec![SessionEvent::Expired {
            reason: ExpiryReason::HardDeadline
        }]
    );

    assert!(!device.sign_in("alice").await);
    assert!(device.registry.get_record("alice").await.is_none());
}

/// Logout purges both persisted records
#[tokio::test]
async fn test_logout_purges_records() {
    let store = memory_store();
    let mut device = Device::new(store.clone(), ManualClock::at_millis(0), "device_a");
    device.sign_in("alice").await;
    assert!(store.get(&session_key("alice")).await.unwrap().is_some());

    device.controller.logout().await;

    assert!(store.get(&session_key("alice")).await.unwrap().is_none());
    assert!(device.registry.get_record("alice").await.is_none());
    assert!(device.controller.timers().is_empty());
}
