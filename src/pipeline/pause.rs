//! Per-scope pause gates
//!
//! Each scope owns one binary semaphore: one permit while running, none while
//! paused. Forwarders rendezvous with the gate before every delivery by
//! acquiring and immediately releasing the permit.
//!
//! The map is guarded by a single mutex that is never held across an await.
//! Gates are reference counted by their leases and removed once the last
//! lease is gone, unless the scope is paused.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tracing::{debug, info};

struct Gate {
    semaphore: Arc<Semaphore>,
    leases: usize,
    paused: bool,
    /// The pause permit has been taken out of the semaphore
    held: bool,
}

impl Gate {
    fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            leases: 0,
            paused: false,
            held: false,
        }
    }
}

type Gates = HashMap<String, Gate>;

/// Registry of pause gates keyed by scope
#[derive(Clone, Default)]
pub struct PauseRegistry {
    gates: Arc<Mutex<Gates>>,
}

impl PauseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Gates> {
        // A panic while holding the lock cannot leave the map half-updated
        self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reference the gate for `scope`, creating it on first use
    pub fn lease(&self, scope: &str) -> GateLease {
        let mut gates = self.lock();
        let gate = gates.entry(scope.to_string()).or_insert_with(Gate::new);
        gate.leases += 1;
        GateLease {
            registry: self.clone(),
            scope: scope.to_string(),
            semaphore: Arc::clone(&gate.semaphore),
        }
    }

    /// Pause one scope. Returns `false` when it was already paused.
    pub async fn pause(&self, scope: &str) -> bool {
        let semaphore = {
            let mut gates = self.lock();
            let gate = gates.entry(scope.to_string()).or_insert_with(Gate::new);
            if gate.paused {
                return false;
            }
            gate.paused = true;
            Arc::clone(&gate.semaphore)
        };

        // Waits at most for an in-flight rendezvous to hand the permit back
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return true, // evicted meanwhile
        };

        let mut gates = self.lock();
        match gates.get_mut(scope) {
            Some(gate) if gate.paused && !gate.held && Arc::ptr_eq(&gate.semaphore, &semaphore) => {
                permit.forget();
                gate.held = true;
                info!(scope, "Scope paused");
            }
            _ => drop(permit),
        }
        true
    }

    /// Resume one scope. Returns `false` when it was not paused.
    pub fn resume(&self, scope: &str) -> bool {
        let mut gates = self.lock();
        let Some(gate) = gates.get_mut(scope) else {
            return false;
        };
        if !gate.paused {
            return false;
        }
        gate.paused = false;
        if gate.held {
            gate.semaphore.add_permits(1);
            gate.held = false;
        }
        if gate.leases == 0 {
            gates.remove(scope);
        }
        info!(scope, "Scope resumed");
        true
    }

    /// Pause every registered scope
    pub async fn pause_all(&self) -> usize {
        let scopes: Vec<String> = self.lock().keys().cloned().collect();
        let mut paused = 0;
        for scope in scopes {
            if self.pause(&scope).await {
                paused += 1;
            }
        }
        paused
    }

    /// Resume every paused scope
    pub fn resume_all(&self) -> usize {
        let scopes = self.paused_scopes();
        scopes.iter().filter(|scope| self.resume(scope)).count()
    }

    pub fn is_paused(&self, scope: &str) -> bool {
        self.lock().get(scope).map_or(false, |g| g.paused)
    }

    /// Paused scopes in name order
    pub fn paused_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, g)| g.paused)
            .map(|(k, _)| k.clone())
            .collect();
        scopes.sort();
        scopes
    }

    /// Number of gates currently registered
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop a scope's gate and release anything waiting on it
    pub fn evict(&self, scope: &str) {
        if let Some(gate) = self.lock().remove(scope) {
            gate.semaphore.close();
            debug!(scope, "Gate evicted");
        }
    }

    fn release(&self, scope: &str, semaphore: &Arc<Semaphore>) {
        let mut gates = self.lock();
        let remove = match gates.get_mut(scope) {
            Some(gate) if Arc::ptr_eq(&gate.semaphore, semaphore) => {
                gate.leases = gate.leases.saturating_sub(1);
                gate.leases == 0 && !gate.paused
            }
            _ => false,
        };
        if remove {
            gates.remove(scope);
        }
    }
}

/// A reference to one scope's gate. Dropping it releases the reference.
pub struct GateLease {
    registry: PauseRegistry,
    scope: String,
    semaphore: Arc<Semaphore>,
}

impl GateLease {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Return once the scope is not paused (or its gate was evicted)
    pub async fn wait_unpaused(&self) {
        if let Ok(permit) = self.semaphore.acquire().await {
            drop(permit);
        }
    }
}

impl Drop for GateLease {
    fn drop(&mut self) {
        self.registry.release(&self.scope, &self.semaphore);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_pause_blocks_and_resume_releases() {
        let registry = PauseRegistry::new();
        let lease = registry.lease("acme");

        timeout(SHORT, lease.wait_unpaused()).await.expect("running gate passes");

        assert!(registry.pause("acme").await);
        assert!(!registry.pause("acme").await);
        assert!(timeout(SHORT, lease.wait_unpaused()).await.is_err());

        assert!(registry.resume("acme"));
        timeout(SHORT, lease.wait_unpaused()).await.expect("resumed gate passes");
        assert!(!registry.resume("acme"));
    }

    #[tokio::test]
    async fn test_resume_wakes_waiter() {
        let registry = PauseRegistry::new();
        let lease = registry.lease("acme");
        registry.pause("acme").await;

        let mut wait = tokio_test::task::spawn(lease.wait_unpaused());
        tokio_test::assert_pending!(wait.poll());

        registry.resume("acme");
        assert!(wait.is_woken());
        tokio_test::assert_ready!(wait.poll());
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let registry = PauseRegistry::new();
        let a = registry.lease("a");
        let b = registry.lease("b");

        registry.pause("a").await;
        assert!(timeout(SHORT, a.wait_unpaused()).await.is_err());
        timeout(SHORT, b.wait_unpaused()).await.expect("b unaffected");
        assert_eq!(registry.paused_scopes(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_pause_all_resume_all() {
        let registry = PauseRegistry::new();
        let a = registry.lease("a");
        let b = registry.lease("b");

        assert_eq!(registry.pause_all().await, 2);
        assert!(timeout(SHORT, a.wait_unpaused()).await.is_err());
        assert!(timeout(SHORT, b.wait_unpaused()).await.is_err());

        assert_eq!(registry.resume_all(), 2);
        timeout(SHORT, a.wait_unpaused()).await.unwrap();
        timeout(SHORT, b.wait_unpaused()).await.unwrap();
    }

    #[tokio::test]
    async fn test_gates_are_collected() {
        let registry = PauseRegistry::new();
        let first = registry.lease("acme");
        let second = registry.lease("acme");
        assert_eq!(registry.len(), 1);

        drop(first);
        assert_eq!(registry.len(), 1);
        drop(second);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_paused_gate_survives_last_lease() {
        let registry = PauseRegistry::new();
        let lease = registry.lease("acme");
        registry.pause("acme").await;
        drop(lease);

        assert!(registry.is_paused("acme"));
        let again = registry.lease("acme");
        assert!(timeout(SHORT, again.wait_unpaused()).await.is_err());

        registry.resume("acme");
        drop(again);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_evict_releases_waiters() {
        let registry = PauseRegistry::new();
        let lease = registry.lease("acme");
        registry.pause("acme").await;

        let waiter = tokio::spawn(async move {
            lease.wait_unpaused().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.evict("acme");

        timeout(SHORT, waiter).await.expect("waiter released").unwrap();
        assert!(registry.is_empty());
    }
}
