use crate::audit::AuditSink;
use crate::config::Config;
use crate::directory::{AccountRegistry, ServerDirectory};
use crate::error::Result;
use crate::models::ServerRecord;
use crate::orchestrator::Orchestrator;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use tokio::time::Instant;

/// Server records and account names pushed by the back office.
#[derive(Default)]
pub struct Inventory {
    servers: DashMap<String, ServerRecord>,
    reseller_usernames: RwLock<Vec<String>>,
    streaming_logins: RwLock<Vec<String>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let inventory = Self::new();
        for server in &config.servers {
            inventory.upsert_server(server.clone());
        }
        inventory.replace_accounts(
            config.accounts.reseller_usernames.clone(),
            config.accounts.streaming_logins.clone(),
        );
        inventory
    }

    pub fn upsert_server(&self, record: ServerRecord) {
        self.servers.insert(record.host_address.clone(), record);
    }

    pub fn remove_server(&self, host: &str) -> bool {
        self.servers.remove(host).is_some()
    }

    /// Replaces the server list, dropping hosts that are no longer present.
    pub fn replace_servers(&self, records: Vec<ServerRecord>) {
        let keep: std::collections::HashSet<&String> =
            records.iter().map(|r| &r.host_address).collect();
        self.servers.retain(|host, _| keep.contains(host));
        for record in records {
            self.upsert_server(record);
        }
    }

    pub fn replace_accounts(&self, reseller_usernames: Vec<String>, streaming_logins: Vec<String>) {
        *write(&self.reseller_usernames) = reseller_usernames;
        *write(&self.streaming_logins) = streaming_logins;
    }

    pub fn active_server_count(&self) -> usize {
        self.servers.iter().filter(|s| s.is_active()).count()
    }

    pub fn account_name_count(&self) -> usize {
        let mut names: std::collections::HashSet<String> = read(&self.reseller_usernames)
            .iter()
            .filter(|u| !u.trim().is_empty())
            .cloned()
            .collect();
        names.extend(read(&self.streaming_logins).iter().cloned());
        names.len()
    }
}

// A poisoned lock only means a writer panicked mid-assignment of a Vec.
fn read(lock: &RwLock<Vec<String>>) -> std::sync::RwLockReadGuard<'_, Vec<String>> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write(lock: &RwLock<Vec<String>>) -> std::sync::RwLockWriteGuard<'_, Vec<String>> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl ServerDirectory for Inventory {
    async fn find(&self, host: &str) -> Result<Option<ServerRecord>> {
        Ok(self.servers.get(host).map(|r| r.value().clone()))
    }
}

#[async_trait]
impl AccountRegistry for Inventory {
    async fn reseller_usernames(&self) -> Result<Vec<String>> {
        Ok(read(&self.reseller_usernames).clone())
    }

    async fn streaming_logins(&self) -> Result<Vec<String>> {
        Ok(read(&self.streaming_logins).clone())
    }
}

/// Top-level application state shared across all handlers
pub struct AppState {
    pub start_time: Instant,
    pub inventory: Arc<Inventory>,
    pub orchestrator: Arc<Orchestrator>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub fn new(inventory: Arc<Inventory>, orchestrator: Arc<Orchestrator>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            start_time: Instant::now(),
            inventory,
            orchestrator,
            audit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServerStatus;

    fn record(host: &str) -> ServerRecord {
        ServerRecord {
            host_address: host.into(),
            admin_secret: "pw".into(),
            control_port: 22,
            status: ServerStatus::Active,
        }
    }

    #[tokio::test]
    async fn replace_servers_drops_missing_hosts() {
        let inventory = Inventory::new();
        inventory.upsert_server(record("10.0.0.1"));
        inventory.upsert_server(record("10.0.0.2"));

        let mut updated = record("10.0.0.2");
        updated.control_port = 2222;
        inventory.replace_servers(vec![updated, record("10.0.0.3")]);

        assert!(inventory.find("10.0.0.1").await.unwrap().is_none());
        assert_eq!(inventory.find("10.0.0.2").await.unwrap().unwrap().control_port, 2222);
        assert!(inventory.find("10.0.0.3").await.unwrap().is_some());
        assert_eq!(inventory.active_server_count(), 2);
    }

    #[test]
    fn seeds_from_config() {
        let mut config = Config::default();
        config.servers.push(record("10.0.0.1"));
        config.accounts.reseller_usernames = vec!["r1".into(), "".into()];
        config.accounts.streaming_logins = vec!["alice".into(), "r1".into()];

        let inventory = Inventory::from_config(&config);
        assert_eq!(inventory.active_server_count(), 1);
        assert_eq!(inventory.account_name_count(), 2);
        assert!(inventory.remove_server("10.0.0.1"));
        assert!(!inventory.remove_server("10.0.0.1"));
    }
}
