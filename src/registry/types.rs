// Registry types and persisted layout

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Persisted key holding this installation's device identity
pub const DEVICE_KEY: &str = "mathApp_deviceId";

/// Persisted key holding the username -> active session table
pub const REGISTRY_KEY: &str = "mathApp_activeSessions";

/// Opaque identity of one client installation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Generate a fresh identity of the form `device_<unix-ms>_<random>`
    pub fn generate(now: DateTime<Utc>) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("device_{}_{}", now.timestamp_millis(), &random[..9]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binding of a username to the one device allowed to act as it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessionRecord {
    pub username: String,
    pub device_id: DeviceId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub login_time: DateTime<Utc>,
}

impl ActiveSessionRecord {
    pub fn new(username: &str, device_id: DeviceId, login_time: DateTime<Utc>) -> Self {
        Self {
            username: username.to_string(),
            device_id,
            login_time,
        }
    }

    pub fn is_bound_to(&self, device_id: &DeviceId) -> bool {
        &self.device_id == device_id
    }
}

/// Ordered username -> record table.
///
/// Serialized as a JSON array of `[username, record]` pairs. Keys are unique;
/// inserting an existing username replaces its record in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(String, ActiveSessionRecord)>", into = "Vec<(String, ActiveSessionRecord)>")]
pub struct RegistryTable {
    entries: Vec<(String, ActiveSessionRecord)>,
}

impl RegistryTable {
    /// Decode a persisted table; malformed input yields an empty table
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(table) => table,
            Err(e) => {
                warn!("Discarding corrupt session registry: {}", e);
                Self::default()
            }
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn get(&self, username: &str) -> Option<&ActiveSessionRecord> {
        self.entries
            .iter()
            .find(|(name, _)| name == username)
            .map(|(_, record)| record)
    }

    pub fn insert(&mut self, record: ActiveSessionRecord) {
        match self
            .entries
            .iter_mut()
            .find(|(name, _)| *name == record.username)
        {
            Some((_, existing)) => *existing = record,
            None => self.entries.push((record.username.clone(), record)),
        }
    }

    pub fn remove(&mut self, username: &str) -> Option<ActiveSessionRecord> {
        let index = self.entries.iter().position(|(name, _)| name == username)?;
        Some(self.entries.remove(index).1)
    }

    /// First username (in table order) bound to `device_id`
    pub fn find_by_device(&self, device_id: &DeviceId) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, record)| record.is_bound_to(device_id))
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveSessionRecord> {
        self.entries.iter().map(|(_, record)| record)
    }
}

impl From<Vec<(String, ActiveSessionRecord)>> for RegistryTable {
    fn from(pairs: Vec<(String, ActiveSessionRecord)>) -> Self {
        let mut table = Self::default();
        for (username, mut record) in pairs {
            // The pair key is authoritative for lookups
            record.username = username;
            table.insert(record);
        }
        table
    }
}

impl From<RegistryTable> for Vec<(String, ActiveSessionRecord)> {
    fn from(table: RegistryTable) -> Self {
        table.entries
    }
}
