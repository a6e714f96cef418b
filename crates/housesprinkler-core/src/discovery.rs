//! Shared service-discovery plumbing used by both the control plane
//! (spec.md §4.1) and the watering-index aggregator (spec.md §4.2).
//!
//! Both subsystems discover providers of a given `kind` ("control" or
//! "waterindex") through the same external registry and poll them at a
//! throttled cadence. This module factors that shared shape out, grounded
//! in how `pomodoroom-core::integrations` keeps provider polling (Google,
//! Notion, Linear, ...) behind one small trait rather than duplicating the
//! HTTP plumbing per integration.

/// Abstraction over the external service registry (the houseportal
/// registration handshake is out of scope per spec.md §1; only its
/// contract -- a list of provider base URLs for a given kind -- is
/// modeled here).
pub trait ServiceRegistry: Send + Sync {
    /// Base URLs of all currently-known providers of `kind`.
    fn providers(&self, kind: &str) -> Vec<String>;

    /// Whether the registry's view has changed since it was last
    /// consulted. A change forces an immediate rescan regardless of the
    /// cadence (spec.md §4.1).
    fn take_changed(&self) -> bool;
}

/// A registry that never reports any providers or changes, useful as a
/// default when no discovery mechanism is wired up.
#[derive(Debug, Default)]
pub struct EmptyRegistry;

impl ServiceRegistry for EmptyRegistry {
    fn providers(&self, _kind: &str) -> Vec<String> {
        Vec::new()
    }

    fn take_changed(&self) -> bool {
        false
    }
}

/// Gates how often an action may run: "at most once per `min_interval`
/// seconds, unless forced".
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    min_interval_secs: i64,
    last_at: Option<i64>,
}

impl Cadence {
    pub fn new(min_interval_secs: i64) -> Self {
        Self {
            min_interval_secs,
            last_at: None,
        }
    }

    /// Returns true (and records `now`) if the action is due: either it
    /// has never run, the minimum interval has elapsed, or `force` is set
    /// (e.g. the registry reported a change).
    pub fn due(&mut self, now: i64, force: bool) -> bool {
        let due = force
            || match self.last_at {
                None => true,
                Some(last) => now - last >= self.min_interval_secs,
            };
        if due {
            self.last_at = Some(now);
        }
        due
    }

    pub fn set_min_interval(&mut self, min_interval_secs: i64) {
        self.min_interval_secs = min_interval_secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_fires_immediately_then_waits() {
        let mut cadence = Cadence::new(60);
        assert!(cadence.due(0, false));
        assert!(!cadence.due(10, false));
        assert!(cadence.due(60, false));
    }

    #[test]
    fn cadence_force_bypasses_interval() {
        let mut cadence = Cadence::new(60);
        cadence.due(0, false);
        assert!(cadence.due(1, true));
    }
}
