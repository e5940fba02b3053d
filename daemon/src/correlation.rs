use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Where a notification id came from. Only generated ids are swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum IdSource {
    Generated,
    Tagged,
}

/// Links a live native notification to the tab that asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabCorrelationEntry {
    pub notification_id: String,
    pub tab_id: Option<i64>,
    pub window_id: Option<i64>,
    /// Opened in a new tab when the original tab is gone.
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub id_source: IdSource,
}

/// `<unix millis>-<12 random hex chars>`
pub fn generate_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.timestamp_millis(), &suffix[..12])
}

/// At most one entry per notification id. Every operation is atomic per key.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: DashMap<String, TabCorrelationEntry>,
}
impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entry`, replacing whatever was recorded under the same id.
    pub fn insert(&self, entry: TabCorrelationEntry) -> Option<TabCorrelationEntry> {
        self.entries.insert(entry.notification_id.clone(), entry)
    }

    pub fn get(&self, id: &str) -> Option<TabCorrelationEntry> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    /// Removing a missing id is a no-op.
    pub fn remove(&self, id: &str) -> Option<TabCorrelationEntry> {
        self.entries.remove(id).map(|(_, e)| e)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops generated-id entries older than `retention`. Tagged entries are
    /// left alone whatever their age. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>, retention: TimeDelta) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let stale = entry.id_source == IdSource::Generated && now - entry.created_at > retention;
            if stale {
                removed += 1;
            }
            !stale
        });
        removed
    }
}
