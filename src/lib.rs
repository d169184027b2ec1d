//! Closure-table hierarchies on top of SeaORM.
//!
//! A tree is stored as two relations: the caller's node table and a closure table
//! holding one `(ancestor, descendant, depth)` row for every pair of nodes where the
//! descendant is reachable from the ancestor, including a zero-depth row per node.
//! Ancestor, descendant, parent and child lookups are then single indexed queries;
//! the [`ClosureTableRepository`] keeps those rows consistent across inserts, moves,
//! unlinks and subtree deletions. PostgreSQL and SQLite are supported.

pub mod config;
pub mod error;
pub mod lock;
pub mod repository;
pub mod traits;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::config::{
        AdvisoryLockStrategy, ClosureTableConfig, ClosureTableOptions, DependentBehavior,
    };
    pub use crate::repository::{ClosureEdge, ClosureTableRepository};
    pub use crate::traits::ClosureTableModel;
}

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

pub use closure_table_macros::ClosureTableModel as ClosureTableModelDerive;
#[doc(hidden)]
pub use closure_table_macros::ClosureTableModel;
pub use config::{
    AdvisoryLockKey, AdvisoryLockStrategy, ClosureTableConfig, ClosureTableOptions,
    DependentBehavior,
};
pub use error::ClosureTableError;
pub use repository::{ClosureEdge, ClosureTableRepository};
pub use traits::ClosureTableModel;
