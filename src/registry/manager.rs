// Device registry: which device owns which username

use super::types::{ActiveSessionRecord, DEVICE_KEY, DeviceId, REGISTRY_KEY, RegistryTable};
use crate::clock::Clock;
use crate::storage::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Registry enforcing that a username is logged in on at most one device.
///
/// Constructed once per process and shared by reference with the session
/// controller. All state lives in the injected store; the registry itself only
/// caches this device's identity.
pub struct DeviceRegistry {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    device_id: DeviceId,
}

impl DeviceRegistry {
    /// Open the registry, loading or creating this device's identity
    pub async fn open(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let device_id = Self::get_or_create_device_id(store.as_ref(), clock.as_ref()).await;
        Self::with_device_id(store, clock, device_id)
    }

    /// Build a registry for an explicitly supplied device identity
    pub fn with_device_id(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        device_id: DeviceId,
    ) -> Self {
        Self {
            store,
            clock,
            device_id,
        }
    }

    /// Return the persisted device identity, generating and persisting one on first use.
    ///
    /// A failed read counts as "no identity" and triggers creation.
    pub async fn get_or_create_device_id(store: &dyn KeyValueStore, clock: &dyn Clock) -> DeviceId {
        match store.get(DEVICE_KEY).await {
            Ok(Some(existing)) if !existing.trim().is_empty() => return DeviceId::from(existing),
            Ok(_) => {}
            Err(e) => warn!("Failed to read device identity, generating a new one: {}", e),
        }

        let device_id = DeviceId::generate(clock.now());
        if let Err(e) = store.set(DEVICE_KEY, device_id.to_string()).await {
            error!("Failed to persist device identity {}: {}", device_id, e);
        } else {
            info!("Created device identity {}", device_id);
        }
        device_id
    }

    pub fn current_device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Bind `username` to this device.
    ///
    /// Returns false when the username is already bound to another device; in
    /// that case nothing is written. A repeated login from the owning device
    /// succeeds and leaves the existing record untouched.
    pub async fn login(&self, username: &str) -> bool {
        let mut table = self.load_table().await;

        if let Some(existing) = table.get(username) {
            if !existing.is_bound_to(&self.device_id) {
                warn!(
                    "Login for {} rejected: already active on device {}",
                    username, existing.device_id
                );
                return false;
            }
            debug!("User {} already bound to this device", username);
            return true;
        }

        table.insert(ActiveSessionRecord::new(
            username,
            self.device_id.clone(),
            self.clock.now(),
        ));
        self.save_table(&table).await;

        info!("User {} logged in on device {}", username, self.device_id);
        true
    }

    /// Remove the binding for `username` if, and only if, this device owns it
    pub async fn logout(&self, username: &str) {
        let mut table = self.load_table().await;

        match table.get(username) {
            Some(record) if record.is_bound_to(&self.device_id) => {
                table.remove(username);
                self.save_table(&table).await;
                info!("User {} logged out from device {}", username, self.device_id);
            }
            Some(record) => debug!(
                "Ignoring logout for {}: owned by device {}",
                username, record.device_id
            ),
            None => debug!("Ignoring logout for {}: no active session", username),
        }
    }

    pub async fn is_user_logged_in_elsewhere(&self, username: &str) -> bool {
        self.load_table()
            .await
            .get(username)
            .is_some_and(|record| !record.is_bound_to(&self.device_id))
    }

    /// Username currently bound to this device, if any
    pub async fn has_active_session_on_device(&self) -> Option<String> {
        self.load_table()
            .await
            .find_by_device(&self.device_id)
            .map(str::to_string)
    }

    /// Look up the record for `username`
    pub async fn get_record(&self, username: &str) -> Option<ActiveSessionRecord> {
        self.load_table().await.get(username).cloned()
    }

    /// Wipe the whole registry regardless of ownership
    pub async fn clear_all_sessions(&self) {
        match self.store.remove(REGISTRY_KEY).await {
            Ok(()) => info!("Cleared all active sessions"),
            Err(e) => error!("Failed to clear session registry: {}", e),
        }
    }

    async fn load_table(&self) -> RegistryTable {
        match self.store.get(REGISTRY_KEY).await {
            Ok(Some(raw)) => RegistryTable::decode(&raw),
            Ok(None) => RegistryTable::default(),
            Err(e) => {
                warn!("Failed to load session registry, treating as empty: {}", e);
                RegistryTable::default()
            }
        }
    }

    async fn save_table(&self, table: &RegistryTable) {
        let encoded = match table.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to encode session registry: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(REGISTRY_KEY, encoded).await {
            error!("Failed to save session registry: {}", e);
        }
    }
}
