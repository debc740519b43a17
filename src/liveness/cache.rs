//! Liveness Result Cache
//!
//! Latest probe result per target id. The prober is the only writer; any
//! number of request handlers read concurrently. Each key is replaced as a
//! whole, so readers never see a half-written result.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::probe::{ProbeErrorKind, ProbeOutcome};

/// Reachability of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessState {
    Online,
    Offline,
    /// Never probed, or no longer monitored
    #[default]
    Unknown,
}

impl LivenessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessState::Online => "online",
            LivenessState::Offline => "offline",
            LivenessState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LivenessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest probe result for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessResult {
    pub target_id: String,
    pub state: LivenessState,
    pub observed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeErrorKind>,
    /// Last time the target was seen online, carried across rounds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_online_at: Option<DateTime<Utc>>,
}

/// Shared map of target id to latest result
#[derive(Debug, Clone, Default)]
pub struct LivenessCache {
    entries: Arc<DashMap<String, LivenessResult>>,
}

impl LivenessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest result for a target, if it has been probed
    pub fn get(&self, target_id: &str) -> Option<LivenessResult> {
        self.entries.get(target_id).map(|entry| entry.value().clone())
    }

    /// State of a target; absent targets read as `Unknown`
    pub fn state(&self, target_id: &str) -> LivenessState {
        self.entries
            .get(target_id)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    /// Record a probe outcome, replacing any previous result
    pub fn record(&self, target_id: &str, outcome: &ProbeOutcome) -> LivenessResult {
        let now = Utc::now();
        let state = if outcome.reachable {
            LivenessState::Online
        } else {
            LivenessState::Offline
        };

        let mut entry = self
            .entries
            .entry(target_id.to_string())
            .or_insert_with(|| LivenessResult {
                target_id: target_id.to_string(),
                state: LivenessState::Unknown,
                observed_at: now,
                status_code: None,
                error: None,
                last_online_at: None,
            });

        let last_online_at = if outcome.reachable {
            Some(now)
        } else {
            entry.last_online_at
        };

        *entry = LivenessResult {
            target_id: target_id.to_string(),
            state,
            observed_at: now,
            status_code: outcome.status_code,
            error: outcome.error,
            last_online_at,
        };
        entry.value().clone()
    }

    /// Drop results for targets not in `ids`
    pub fn retain_ids(&self, ids: &HashSet<&str>) {
        self.entries.retain(|id, _| ids.contains(id.as_str()));
    }

    /// State of every cached target
    pub fn snapshot(&self) -> HashMap<String, LivenessState> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.state))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_target_is_unknown() {
        let cache = LivenessCache::new();
        assert_eq!(cache.state("never-probed"), LivenessState::Unknown);
        assert!(cache.get("never-probed").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_online_and_offline() {
        let cache = LivenessCache::new();

        let result = cache.record("app", &ProbeOutcome::status(200));
        assert_eq!(result.state, LivenessState::Online);
        assert_eq!(result.status_code, Some(200));
        assert!(result.last_online_at.is_some());
        assert_eq!(cache.state("app"), LivenessState::Online);

        let result = cache.record("app", &ProbeOutcome::failed(ProbeErrorKind::Timeout));
        assert_eq!(result.state, LivenessState::Offline);
        assert_eq!(result.error, Some(ProbeErrorKind::Timeout));
        assert!(result.last_online_at.is_some(), "last online time is kept");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_retain_ids() {
        let cache = LivenessCache::new();
        cache.record("a", &ProbeOutcome::status(200));
        cache.record("b", &ProbeOutcome::status(500));

        cache.retain_ids(&["a"].into_iter().collect());
        assert_eq!(cache.state("a"), LivenessState::Online);
        assert_eq!(cache.state("b"), LivenessState::Unknown);
    }

    #[test]
    fn test_snapshot_and_clone_share_entries() {
        let cache = LivenessCache::new();
        let reader = cache.clone();
        cache.record("a", &ProbeOutcome::status(302));
        cache.record("b", &ProbeOutcome::status(404));

        let snapshot = reader.snapshot();
        assert_eq!(snapshot.get("a"), Some(&LivenessState::Online));
        assert_eq!(snapshot.get("b"), Some(&LivenessState::Offline));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&LivenessState::Unknown).unwrap(),
            "\"unknown\""
        );
        let result = LivenessCache::new().record("x", &ProbeOutcome::status(200));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["targetId"], "x");
        assert_eq!(json["state"], "online");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let cache = LivenessCache::new();
        let writer = cache.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..1_000u16 {
                let outcome = if i % 2 == 0 {
                    ProbeOutcome::status(200)
                } else {
                    ProbeOutcome::failed(ProbeErrorKind::Connect)
                };
                writer.record("svc", &outcome);
            }
        });

        for _ in 0..1_000 {
            if let Some(result) = cache.get("svc") {
                // A result is always internally consistent
                match result.state {
                    LivenessState::Online => assert_eq!(result.status_code, Some(200)),
                    LivenessState::Offline => assert_eq!(result.error, Some(ProbeErrorKind::Connect)),
                    LivenessState::Unknown => panic!("recorded results are never unknown"),
                }
            }
        }
        handle.join().unwrap();
    }
}
