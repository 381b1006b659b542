use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use crate::config::ListConfig;

/// Process-wide allow/deny lists, shared between Stage 1 and the policy
/// engine. Reads vastly outnumber updates, hence `RwLock`.
///
/// A poisoned lock is recovered rather than reported: the sets hold no
/// invariant a panicking writer could have broken halfway.
#[derive(Debug, Default)]
pub struct AccessLists {
    blocked_users: RwLock<HashSet<String>>,
    blocked_ips: RwLock<HashSet<String>>,
    allowed_users: RwLock<HashSet<String>>,
}

fn read(set: &RwLock<HashSet<String>>) -> RwLockReadGuard<'_, HashSet<String>> {
    set.read().unwrap_or_else(|e| e.into_inner())
}

fn write(set: &RwLock<HashSet<String>>) -> RwLockWriteGuard<'_, HashSet<String>> {
    set.write().unwrap_or_else(|e| e.into_inner())
}

impl AccessLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ListConfig) -> Self {
        Self {
            blocked_users: RwLock::new(config.blocked_users.iter().cloned().collect()),
            blocked_ips: RwLock::new(config.blocked_ips.iter().cloned().collect()),
            allowed_users: RwLock::new(config.allowed_users.iter().cloned().collect()),
        }
    }

    pub fn is_user_blocked(&self, user_id: &str) -> bool {
        read(&self.blocked_users).contains(user_id)
    }

    pub fn is_ip_blocked(&self, ip: &str) -> bool {
        read(&self.blocked_ips).contains(ip)
    }

    pub fn is_user_allowed(&self, user_id: &str) -> bool {
        read(&self.allowed_users).contains(user_id)
    }

    /// Blocks `user_id`, removing it from the allowlist if present.
    pub fn block_user(&self, user_id: &str) {
        write(&self.allowed_users).remove(user_id);
        write(&self.blocked_users).insert(user_id.to_string());
        info!(user_id, "user added to blocklist");
    }

    pub fn unblock_user(&self, user_id: &str) -> bool {
        write(&self.blocked_users).remove(user_id)
    }

    pub fn allow_user(&self, user_id: &str) {
        write(&self.allowed_users).insert(user_id.to_string());
        info!(user_id, "user added to allowlist");
    }

    pub fn block_ip(&self, ip: &str) {
        write(&self.blocked_ips).insert(ip.to_string());
        info!(ip, "ip added to blocklist");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_from_default_config() {
        let lists = AccessLists::from_config(&ListConfig::default());
        assert!(lists.is_user_blocked("user_fraud_123"));
        assert!(lists.is_ip_blocked("10.0.0.99"));
        assert!(lists.is_user_allowed("admin_superuser"));
        assert!(!lists.is_user_blocked("alice"));
    }

    #[test]
    fn test_block_user_revokes_allow() {
        let lists = AccessLists::new();
        lists.allow_user("bob");
        lists.block_user("bob");
        assert!(lists.is_user_blocked("bob"));
        assert!(!lists.is_user_allowed("bob"));
        assert!(lists.unblock_user("bob"));
        assert!(!lists.unblock_user("bob"));
    }

    #[test]
    fn test_concurrent_updates_visible() {
        let lists = Arc::new(AccessLists::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let lists = Arc::clone(&lists);
                std::thread::spawn(move || lists.block_ip(&format!("10.1.0.{}", i)))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for i in 0..8 {
            assert!(lists.is_ip_blocked(&format!("10.1.0.{}", i)));
        }
    }
}
