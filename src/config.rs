use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

/// Static configuration describing how a SeaORM model integrates with
/// its closure relation.
#[derive(Clone, Debug)]
pub struct ClosureTableConfig {
    entity_name: String,
    closure_name: String,
    dependent_behavior: DependentBehavior,
    advisory_lock_strategy: AdvisoryLockStrategy,
}

impl ClosureTableConfig {
    /// Create a new configuration using the logical entity and closure names.
    pub fn new(entity_name: impl Into<String>, closure_name: impl Into<String>) -> Self {
        let entity_name = entity_name.into();
        let closure_name = closure_name.into();

        let default_lock = AdvisoryLockStrategy::Namespaced(AdvisoryLockKey::derived_from(
            &entity_name,
            &closure_name,
        ));

        Self {
            entity_name,
            closure_name,
            dependent_behavior: DependentBehavior::default(),
            advisory_lock_strategy: default_lock,
        }
    }

    /// Merge options produced by [`ClosureTableOptions`].
    pub(crate) fn apply_options(mut self, options: ClosureTableOptions) -> Self {
        if let Some(behavior) = options.dependent_behavior {
            self.dependent_behavior = behavior;
        }
        if let Some(strategy) = options.advisory_lock_strategy {
            self.advisory_lock_strategy = strategy;
        }
        self
    }

    /// Human-readable Rust struct name for the node entity.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Name of the entity holding the closure rows.
    pub fn closure_name(&self) -> &str {
        &self.closure_name
    }

    /// What happens to descendant node records when a subtree is deleted.
    pub fn dependent_behavior(&self) -> DependentBehavior {
        self.dependent_behavior
    }

    /// Advisory lock strategy (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }
}

/// Builder-style options consumed by the derive macro.
#[derive(Clone, Debug, Default)]
pub struct ClosureTableOptions {
    dependent_behavior: Option<DependentBehavior>,
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
}

impl ClosureTableOptions {
    pub fn dependent_behavior(mut self, behavior: DependentBehavior) -> Self {
        self.dependent_behavior = Some(behavior);
        self
    }

    pub fn advisory_lock_strategy(mut self, strategy: AdvisoryLockStrategy) -> Self {
        self.advisory_lock_strategy = Some(strategy);
        self
    }

    pub fn apply(self, base: ClosureTableConfig) -> ClosureTableConfig {
        base.apply_options(self)
    }
}

/// Behaviour applied to the node records of descendants discarded by
/// `delete_subtree`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentBehavior {
    /// Only closure rows are removed; the records stay behind for the caller.
    #[default]
    Orphan,
    /// Descendant records are deleted in the same transaction.
    Destroy,
}

/// Key used for PostgreSQL advisory locks.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AdvisoryLockKey(String);

impl AdvisoryLockKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn derived_from(entity: &str, closure: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(entity.as_bytes());
        hasher.update(b"/");
        hasher.update(closure.as_bytes());
        let crc = hasher.finalize();
        Self(format!("closure-table::{entity}::{closure}::{crc:x}"))
    }
}

/// Configuration describing how to acquire advisory locks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvisoryLockStrategy {
    Disabled,
    Namespaced(AdvisoryLockKey),
}

impl AdvisoryLockStrategy {
    pub fn key(&self) -> Option<&AdvisoryLockKey> {
        match self {
            AdvisoryLockStrategy::Disabled => None,
            AdvisoryLockStrategy::Namespaced(key) => Some(key),
        }
    }
}
