//! Monitored Targets
//!
//! The list of bookmarked services the liveness prober checks. The prober
//! only ever reads this list, once per probing round, through the
//! [`TargetStore`] port.

mod file;

pub use file::FileTargetStore;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A service whose reachability is tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    /// Stable identifier used as the liveness cache key
    pub id: String,
    pub name: String,
    pub category: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

impl MonitoredTarget {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            url: url.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Source of the monitored target list
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// All targets, ordered by category then name
    async fn list_targets(&self) -> Result<Vec<MonitoredTarget>>;
}

/// Order targets by category, then name
pub fn sort_targets(targets: &mut [MonitoredTarget]) {
    targets.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Reject lists with empty or duplicate ids or unparseable URLs
pub fn validate_targets(targets: &[MonitoredTarget]) -> Result<()> {
    let mut seen = HashSet::new();
    for target in targets {
        if target.id.trim().is_empty() {
            return Err(Error::TargetStore(format!(
                "target '{}' has an empty id",
                target.name
            )));
        }
        if !seen.insert(target.id.as_str()) {
            return Err(Error::TargetStore(format!(
                "duplicate target id: {}",
                target.id
            )));
        }
        reqwest::Url::parse(&target.url).map_err(|e| {
            Error::TargetStore(format!("target {} has invalid url: {}", target.id, e))
        })?;
    }
    Ok(())
}

// =============================================================================
// Static Store
// =============================================================================

/// Fixed in-memory target list
#[derive(Debug, Clone, Default)]
pub struct StaticTargetStore {
    targets: Vec<MonitoredTarget>,
}

impl StaticTargetStore {
    pub fn new(mut targets: Vec<MonitoredTarget>) -> Self {
        sort_targets(&mut targets);
        Self { targets }
    }

    /// The seed list a fresh dashboard starts with
    pub fn homelab_defaults() -> Self {
        Self::new(vec![
            MonitoredTarget::new("hub", "Homelab Hub", "Dashboard", "http://192.168.15.100/")
                .with_description("Main dashboard (this page)."),
            MonitoredTarget::new(
                "portainer",
                "Portainer",
                "Containers",
                "http://192.168.15.100:9000/",
            )
            .with_description("Docker and stacks UI (Portainer CE)."),
            MonitoredTarget::new(
                "prompt-vault",
                "Prompt Vault",
                "Tools",
                "http://192.168.15.100:3000/",
            )
            .with_description("Prompt Vault app."),
        ])
    }
}

#[async_trait]
impl TargetStore for StaticTargetStore {
    async fn list_targets(&self) -> Result<Vec<MonitoredTarget>> {
        Ok(self.targets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_store_orders_by_category_then_name() {
        let store = StaticTargetStore::new(vec![
            MonitoredTarget::new("3", "Zeta", "Tools", "http://z.local/"),
            MonitoredTarget::new("1", "Beta", "Media", "http://b.local/"),
            MonitoredTarget::new("2", "Alpha", "Tools", "http://a.local/"),
        ]);

        let ids: Vec<_> = store
            .list_targets()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_homelab_defaults_are_valid() {
        let targets = StaticTargetStore::homelab_defaults()
            .list_targets()
            .await
            .unwrap();
        assert_eq!(targets.len(), 3);
        assert!(validate_targets(&targets).is_ok());
        assert_eq!(targets[0].category, "Containers");
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_urls() {
        let dup = vec![
            MonitoredTarget::new("a", "A", "X", "http://a/"),
            MonitoredTarget::new("a", "B", "X", "http://b/"),
        ];
        assert!(matches!(validate_targets(&dup), Err(Error::TargetStore(_))));

        let bad = vec![MonitoredTarget::new("a", "A", "X", "not a url")];
        assert!(validate_targets(&bad).is_err());

        let empty = vec![MonitoredTarget::new(" ", "A", "X", "http://a/")];
        assert!(validate_targets(&empty).is_err());
    }

    #[test]
    fn test_target_description_defaults_when_missing() {
        let json = r#"{"id":"a","name":"A","category":"X","url":"http://a/"}"#;
        let target: MonitoredTarget = serde_json::from_str(json).unwrap();
        assert_eq!(target.description, "");
    }
}
