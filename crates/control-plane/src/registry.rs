//! Advisory tenant registry. A cache in front of the cluster, never the source of truth:
//! callers must tolerate a miss and fall back to a live cluster query.
use dashmap::DashMap;
use crate::models::TenantRecord;

pub trait TenantStore: Send + Sync + 'static {
    fn insert(&self, record: TenantRecord);
    fn remove(&self, name: &str) -> Option<TenantRecord>;
    fn get(&self, name: &str) -> Option<TenantRecord>;
    /// Snapshot ordered by tenant name.
    fn list(&self) -> Vec<TenantRecord>;
    /// Drop every entry and load `records`; used when warming from the cluster.
    fn replace_all(&self, records: Vec<TenantRecord>);
}

/// Process-local store; contents do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryRegistry { tenants: DashMap<String, TenantRecord> }

impl InMemoryRegistry {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.tenants.len() }
    pub fn is_empty(&self) -> bool { self.tenants.is_empty() }
}

impl TenantStore for InMemoryRegistry {
    fn insert(&self, record: TenantRecord) { self.tenants.insert(record.name.clone(), record); }
    fn remove(&self, name: &str) -> Option<TenantRecord> { self.tenants.remove(name).map(|(_, r)| r) }
    fn get(&self, name: &str) -> Option<TenantRecord> { self.tenants.get(name).map(|r| r.value().clone()) }
    fn list(&self) -> Vec<TenantRecord> {
        let mut all: Vec<TenantRecord> = self.tenants.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
    fn replace_all(&self, records: Vec<TenantRecord>) {
        self.tenants.clear();
        for r in records { self.insert(r); }
    }
}
