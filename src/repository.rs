use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use chrono::Utc;
use sea_orm::sea_query::{Index, Table};
use sea_orm::{
    entity::prelude::*, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbBackend,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Schema, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::config::{ClosureTableConfig, DependentBehavior};
use crate::error::ClosureTableError;
use crate::lock::LockedTransaction;
use crate::traits::ClosureTableModel;

/// Upper bound on keys bound into a single statement.
const BATCH_SIZE: usize = 500;

/// One row of the closure relation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClosureEdge<Id> {
    pub ancestor: Id,
    pub descendant: Id,
    pub depth: i32,
}

/// Repository exposing the closure-table operations for a given model.
///
/// Every operation takes the connection it runs on. Reads accept any
/// [`ConnectionTrait`]; mutations also need [`TransactionTrait`] because each one
/// runs in its own (possibly nested) transaction so that no partial edge set is
/// ever left behind.
#[derive(Debug, Default)]
pub struct ClosureTableRepository<M>
where
    M: ClosureTableModel,
{
    _marker: PhantomData<M>,
}

impl<M> ClosureTableRepository<M>
where
    M: ClosureTableModel,
{
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    fn config(&self) -> &'static ClosureTableConfig {
        M::closure_table_config()
    }

    fn ensure_supported(conn: &impl ConnectionTrait) -> Result<(), ClosureTableError> {
        match conn.get_database_backend() {
            DbBackend::Postgres | DbBackend::Sqlite => Ok(()),
            other => Err(ClosureTableError::UnsupportedBackend(other)),
        }
    }

    async fn begin<C>(&self, conn: &C) -> Result<LockedTransaction, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        Self::ensure_supported(conn)?;
        LockedTransaction::acquire(self.config().advisory_lock_strategy(), conn).await
    }

    /// Drop and recreate the node and closure tables, plus the two closure indexes.
    ///
    /// Destroys existing data: run once at initialization, never against a live store.
    pub async fn build_schema<C: ConnectionTrait>(&self, conn: &C) -> Result<(), ClosureTableError> {
        Self::ensure_supported(conn)?;
        let backend = conn.get_database_backend();
        let schema = Schema::new(backend);
        let node = M::Entity::default();
        let closure = M::ClosureEntity::default();

        let drop_closure = Table::drop()
            .table(closure.table_ref())
            .if_exists()
            .to_owned();
        let drop_node = Table::drop().table(node.table_ref()).if_exists().to_owned();
        conn.execute(backend.build(&drop_closure)).await?;
        conn.execute(backend.build(&drop_node)).await?;

        conn.execute(backend.build(&schema.create_table_from_entity(node)))
            .await?;
        conn.execute(backend.build(&schema.create_table_from_entity(closure)))
            .await?;

        let table = closure.table_name();
        let by_ancestor = Index::create()
            .name(format!("{table}_ancestor_depth_idx"))
            .table(closure.table_ref())
            .col(M::closure_ancestor_column())
            .col(M::closure_depth_column())
            .col(M::closure_descendant_column())
            .unique()
            .to_owned();
        let by_descendant = Index::create()
            .name(format!("{table}_descendant_ancestor_idx"))
            .table(closure.table_ref())
            .col(M::closure_descendant_column())
            .col(M::closure_ancestor_column())
            .col(M::closure_depth_column())
            .unique()
            .to_owned();
        conn.execute(backend.build(&by_ancestor)).await?;
        conn.execute(backend.build(&by_descendant)).await?;

        tracing::info!(
            entity = self.config().entity_name(),
            closure = self.config().closure_name(),
            "rebuilt closure-table schema"
        );
        Ok(())
    }

    pub async fn find_node<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M>, ClosureTableError> {
        Self::ensure_supported(conn)?;
        self.find_node_on(conn, id).await
    }

    /// Insert a node record, stamping `updated` with the current time and `version` with 1.
    ///
    /// The record is not part of any tree until `insert_root` or `insert_child` is called.
    pub async fn insert_node<C: ConnectionTrait>(
        &self,
        conn: &C,
        mut active: M::ActiveModel,
    ) -> Result<M, ClosureTableError> {
        Self::ensure_supported(conn)?;
        M::stamp(&mut active, Utc::now(), 1);
        let model = active.insert(conn).await?;
        tracing::debug!(
            entity = self.config().entity_name(),
            id = ?model.id(),
            "inserted node record"
        );
        Ok(model)
    }

    /// Apply `edit` to a node record and bump its version.
    ///
    /// The write only lands if the stored version still equals `model.version()`;
    /// otherwise [`ClosureTableError::VersionConflict`] is returned.
    pub async fn update_node<C, F>(
        &self,
        conn: &C,
        model: &M,
        edit: F,
    ) -> Result<M, ClosureTableError>
    where
        C: ConnectionTrait,
        F: FnOnce(&mut M::ActiveModel),
    {
        Self::ensure_supported(conn)?;
        let id = model.id();
        let expected = model.version();

        let mut active = model.clone().into_active_model();
        edit(&mut active);
        M::stamp(&mut active, Utc::now(), expected + 1);

        let result = M::Entity::update_many()
            .set(active)
            .filter(M::id_column().eq(M::id_to_value(&id)))
            .filter(M::version_column().eq(expected))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return match self.find_node_on(conn, &id).await? {
                Some(_) => Err(ClosureTableError::VersionConflict {
                    id: format!("{id:?}"),
                    expected,
                }),
                None => Err(ClosureTableError::not_found(&id)),
            };
        }

        self.find_node_on(conn, &id)
            .await?
            .ok_or_else(|| ClosureTableError::not_found(&id))
    }

    /// Delete a node record together with its closure rows.
    ///
    /// Refuses while the node still has descendants; delete or move them first.
    pub async fn delete_node<C>(&self, conn: &C, id: &M::Id) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.delete_node_on(guard.connection(), id).await;
        guard.finish(result).await
    }

    /// Height of `id` below its root: the deepest edge ending at `id`.
    ///
    /// `None` when the node has no closure rows.
    pub async fn ancestor_depth<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<i32>, ClosureTableError> {
        Self::ensure_supported(conn)?;
        let deepest = M::ClosureEntity::find()
            .filter(M::closure_descendant_column().eq(M::closure_id_to_value(id)))
            .order_by_desc(M::closure_depth_column())
            .one(conn)
            .await?;
        Ok(deepest.map(|row| M::closure_model_depth(&row)))
    }

    /// Height of the subtree rooted at `id` (0 for a leaf).
    ///
    /// `None` when the node has no closure rows.
    pub async fn descendant_depth<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<i32>, ClosureTableError> {
        Self::ensure_supported(conn)?;
        let deepest = M::ClosureEntity::find()
            .filter(M::closure_ancestor_column().eq(M::closure_id_to_value(id)))
            .order_by_desc(M::closure_depth_column())
            .one(conn)
            .await?;
        Ok(deepest.map(|row| M::closure_model_depth(&row)))
    }

    /// All nodes below `id`, nearest first.
    pub async fn descendants<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M>, ClosureTableError> {
        Self::ensure_supported(conn)?;
        self.ensure_in_tree(conn, id).await?;
        let ids = self.descendant_ids(conn, id, false).await?;
        self.load_models(conn, &ids).await
    }

    pub async fn self_and_descendants<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M>, ClosureTableError> {
        Self::ensure_supported(conn)?;
        self.ensure_in_tree(conn, id).await?;
        let ids = self.descendant_ids(conn, id, true).await?;
        self.load_models(conn, &ids).await
    }

    /// All nodes above `id`, farthest first; the immediate parent comes last.
    pub async fn ancestors<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M>, ClosureTableError> {
        Self::ensure_supported(conn)?;
        self.ensure_in_tree(conn, id).await?;
        let ids = self.ancestor_ids(conn, id, false).await?;
        self.load_models(conn, &ids).await
    }

    pub async fn parent<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M>, ClosureTableError> {
        Self::ensure_supported(conn)?;
        self.ensure_in_tree(conn, id).await?;
        match self.parent_id_on(conn, id).await? {
            Some(parent_id) => self.find_node_on(conn, &parent_id).await,
            None => Ok(None),
        }
    }

    pub async fn children<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M>, ClosureTableError> {
        Self::ensure_supported(conn)?;
        self.ensure_in_tree(conn, id).await?;
        let ids = self.child_ids(conn, id).await?;
        self.load_models(conn, &ids).await
    }

    /// Nodes that are in the tree but have no parent.
    pub async fn roots<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError> {
        Self::ensure_supported(conn)?;
        let reflexive = M::ClosureEntity::find()
            .filter(M::closure_depth_column().eq(0))
            .order_by_asc(M::closure_descendant_column())
            .all(conn)
            .await?;
        let attached = M::ClosureEntity::find()
            .filter(M::closure_depth_column().eq(1))
            .all(conn)
            .await?
            .iter()
            .map(M::closure_model_descendant)
            .collect::<HashSet<_>>();

        let ids = reflexive
            .iter()
            .map(M::closure_model_descendant)
            .filter(|id| !attached.contains(id))
            .collect::<Vec<_>>();
        self.load_models(conn, &ids).await
    }

    /// Dump the whole closure relation ordered by `(ancestor, depth, descendant)`.
    pub async fn edges<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<Vec<ClosureEdge<M::Id>>, ClosureTableError> {
        Self::ensure_supported(conn)?;
        let rows = M::ClosureEntity::find()
            .order_by_asc(M::closure_ancestor_column())
            .order_by_asc(M::closure_depth_column())
            .order_by_asc(M::closure_descendant_column())
            .all(conn)
            .await?;
        Ok(rows
            .iter()
            .map(|row| ClosureEdge {
                ancestor: M::closure_model_ancestor(row),
                descendant: M::closure_model_descendant(row),
                depth: M::closure_model_depth(row),
            })
            .collect())
    }

    /// Make an existing node record a standalone root.
    pub async fn insert_root<C>(&self, conn: &C, id: &M::Id) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.insert_root_on(guard.connection(), id).await;
        guard.finish(result).await
    }

    /// Add an existing node record to the tree as a new leaf under `parent`.
    pub async fn insert_child<C>(
        &self,
        conn: &C,
        parent: &M::Id,
        child: &M::Id,
    ) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.insert_child_on(guard.connection(), parent, child).await;
        guard.finish(result).await
    }

    /// Attach the parentless subtree rooted at `child` under `parent`.
    pub async fn link<C>(
        &self,
        conn: &C,
        parent: &M::Id,
        child: &M::Id,
    ) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self
            .link_on(guard.connection(), parent, child)
            .await
            .map(|_| ());
        guard.finish(result).await
    }

    /// Detach `child` and its subtree from its parent. The subtree stays intact.
    pub async fn unlink<C>(&self, conn: &C, child: &M::Id) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.unlink_on(guard.connection(), child).await.map(|_| ());
        guard.finish(result).await
    }

    /// Detach every child subtree of `id`, returning the detached children.
    pub async fn unlink_children<C>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.unlink_children_on(guard.connection(), id).await;
        guard.finish(result).await
    }

    /// Re-parent the subtree rooted at `child` under `new_parent`.
    pub async fn move_subtree<C>(
        &self,
        conn: &C,
        child: &M::Id,
        new_parent: &M::Id,
    ) -> Result<(), ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self
            .move_subtree_on(guard.connection(), child, new_parent)
            .await;
        guard.finish(result).await
    }

    /// Discard every descendant of `id`, returning their keys.
    ///
    /// `id` itself keeps its place in the tree. Whether the descendants' node
    /// records survive depends on [`DependentBehavior`].
    pub async fn delete_subtree<C>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.delete_subtree_on(guard.connection(), id).await;
        guard.finish(result).await
    }

    async fn insert_root_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        if self.find_node_on(conn, id).await?.is_none() {
            return Err(ClosureTableError::not_found(id));
        }

        let existing = M::ClosureEntity::find()
            .filter(
                Condition::any()
                    .add(M::closure_ancestor_column().eq(M::closure_id_to_value(id)))
                    .add(M::closure_descendant_column().eq(M::closure_id_to_value(id))),
            )
            .one(conn)
            .await?;
        if existing.is_some() {
            return Err(ClosureTableError::invariant(format!(
                "node {id:?} is already part of the tree"
            )));
        }

        M::ClosureEntity::insert(M::closure_build_row(id.clone(), id.clone(), 0))
            .exec_without_returning(conn)
            .await?;

        tracing::debug!(entity = self.config().entity_name(), ?id, "inserted root");
        Ok(())
    }

    async fn insert_child_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: &M::Id,
        child: &M::Id,
    ) -> Result<(), ClosureTableError> {
        self.ensure_in_tree(conn, parent).await?;
        self.insert_root_on(conn, child).await?;
        self.link_on(conn, parent, child).await?;
        Ok(())
    }

    async fn link_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent: &M::Id,
        child: &M::Id,
    ) -> Result<u64, ClosureTableError> {
        self.ensure_in_tree(conn, parent).await?;
        self.ensure_in_tree(conn, child).await?;

        if let Some(current) = self.parent_id_on(conn, child).await? {
            return Err(ClosureTableError::invariant(format!(
                "node {child:?} already has parent {current:?}; unlink it first"
            )));
        }

        let subtree = self.descendant_rows(conn, child, true).await?;
        if subtree
            .iter()
            .any(|row| &M::closure_model_descendant(row) == parent)
        {
            return Err(ClosureTableError::invariant(format!(
                "cannot link {child:?} under {parent:?}: the parent lies inside the subtree"
            )));
        }

        let ancestors = self.ancestor_rows(conn, parent, true).await?;
        let mut rows = Vec::with_capacity(ancestors.len() * subtree.len());
        for ancestor in &ancestors {
            let ancestor_id = M::closure_model_ancestor(ancestor);
            let above = M::closure_model_depth(ancestor);
            for descendant in &subtree {
                rows.push(M::closure_build_row(
                    ancestor_id.clone(),
                    M::closure_model_descendant(descendant),
                    above + M::closure_model_depth(descendant) + 1,
                ));
            }
        }

        let mut written = 0;
        for batch in rows.chunks(BATCH_SIZE) {
            written += M::ClosureEntity::insert_many(batch.to_vec())
                .exec_without_returning(conn)
                .await?;
        }

        tracing::debug!(
            entity = self.config().entity_name(),
            ?parent,
            ?child,
            rows = written,
            "linked subtree"
        );
        Ok(written)
    }

    async fn unlink_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        child: &M::Id,
    ) -> Result<u64, ClosureTableError> {
        self.ensure_in_tree(conn, child).await?;

        let ancestors = self.ancestor_ids(conn, child, false).await?;
        if ancestors.is_empty() {
            return Err(ClosureTableError::invariant(format!(
                "node {child:?} is a root; there is no parent to unlink from"
            )));
        }
        let subtree = self.descendant_ids(conn, child, true).await?;

        let removed = self.delete_edges(conn, &ancestors, &subtree).await?;
        let expected = (ancestors.len() * subtree.len()) as u64;
        if removed != expected {
            return Err(ClosureTableError::invariant(format!(
                "closure rows above {child:?} are incomplete: removed {removed}, expected {expected}"
            )));
        }

        tracing::debug!(
            entity = self.config().entity_name(),
            ?child,
            rows = removed,
            "unlinked subtree"
        );
        Ok(removed)
    }

    async fn unlink_children_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        self.ensure_in_tree(conn, id).await?;

        let children = self.child_ids(conn, id).await?;
        if children.is_empty() {
            return Ok(children);
        }

        let ancestors = self.ancestor_ids(conn, id, true).await?;
        let below = self.descendant_ids(conn, id, false).await?;

        let removed = self.delete_edges(conn, &ancestors, &below).await?;
        let expected = (ancestors.len() * below.len()) as u64;
        if removed != expected {
            return Err(ClosureTableError::invariant(format!(
                "closure rows below {id:?} are incomplete: removed {removed}, expected {expected}"
            )));
        }

        tracing::debug!(
            entity = self.config().entity_name(),
            ?id,
            children = children.len(),
            rows = removed,
            "unlinked children"
        );
        Ok(children)
    }

    async fn move_subtree_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        child: &M::Id,
        new_parent: &M::Id,
    ) -> Result<(), ClosureTableError> {
        self.ensure_in_tree(conn, new_parent).await?;
        if self.parent_id_on(conn, child).await?.is_some() {
            self.unlink_on(conn, child).await?;
        }
        self.link_on(conn, new_parent, child).await?;
        Ok(())
    }

    async fn delete_subtree_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        self.ensure_in_tree(conn, id).await?;

        let doomed = self.descendant_ids(conn, id, false).await?;
        let destroy = self.config().dependent_behavior() == DependentBehavior::Destroy;

        let mut removed = 0;
        for batch in doomed.chunks(BATCH_SIZE) {
            removed += M::ClosureEntity::delete_many()
                .filter(
                    M::closure_descendant_column()
                        .is_in(batch.iter().map(M::closure_id_to_value)),
                )
                .exec(conn)
                .await?
                .rows_affected;

            if destroy {
                M::Entity::delete_many()
                    .filter(M::id_column().is_in(batch.iter().map(M::id_to_value)))
                    .exec(conn)
                    .await?;
            }
        }

        tracing::debug!(
            entity = self.config().entity_name(),
            ?id,
            descendants = doomed.len(),
            rows = removed,
            destroy,
            "deleted subtree"
        );
        Ok(doomed)
    }

    async fn delete_node_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        if self.find_node_on(conn, id).await?.is_none() {
            return Err(ClosureTableError::not_found(id));
        }

        if !self.descendant_ids(conn, id, false).await?.is_empty() {
            return Err(ClosureTableError::invariant(format!(
                "node {id:?} still has descendants; delete or move its subtree first"
            )));
        }

        let removed = M::ClosureEntity::delete_many()
            .filter(M::closure_descendant_column().eq(M::closure_id_to_value(id)))
            .exec(conn)
            .await?
            .rows_affected;
        M::Entity::delete_many()
            .filter(M::id_column().eq(M::id_to_value(id)))
            .exec(conn)
            .await?;

        tracing::debug!(
            entity = self.config().entity_name(),
            ?id,
            rows = removed,
            "deleted node"
        );
        Ok(())
    }

    async fn find_node_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M>, ClosureTableError> {
        let model = M::Entity::find()
            .filter(M::id_column().eq(M::id_to_value(id)))
            .one(conn)
            .await?;
        Ok(model)
    }

    async fn ensure_in_tree<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        let reflexive = M::ClosureEntity::find()
            .filter(M::closure_ancestor_column().eq(M::closure_id_to_value(id)))
            .filter(M::closure_descendant_column().eq(M::closure_id_to_value(id)))
            .filter(M::closure_depth_column().eq(0))
            .one(conn)
            .await?;

        match reflexive {
            Some(_) => Ok(()),
            None => Err(ClosureTableError::not_found(id)),
        }
    }

    async fn parent_id_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M::Id>, ClosureTableError> {
        let row = M::ClosureEntity::find()
            .filter(M::closure_descendant_column().eq(M::closure_id_to_value(id)))
            .filter(M::closure_depth_column().eq(1))
            .one(conn)
            .await?;
        Ok(row.map(|row| M::closure_model_ancestor(&row)))
    }

    async fn child_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let rows = M::ClosureEntity::find()
            .filter(M::closure_ancestor_column().eq(M::closure_id_to_value(id)))
            .filter(M::closure_depth_column().eq(1))
            .order_by_asc(M::closure_descendant_column())
            .all(conn)
            .await?;
        Ok(rows.iter().map(M::closure_model_descendant).collect())
    }

    /// Rows ending at `id`, deepest ancestor first.
    async fn ancestor_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        include_self: bool,
    ) -> Result<Vec<M::ClosureModel>, ClosureTableError> {
        let mut query = M::ClosureEntity::find()
            .filter(M::closure_descendant_column().eq(M::closure_id_to_value(id)));

        if !include_self {
            query = query.filter(M::closure_depth_column().gt(0));
        }

        let rows = query
            .order_by_desc(M::closure_depth_column())
            .all(conn)
            .await?;
        Ok(rows)
    }

    /// Rows starting at `id`, nearest descendant first.
    async fn descendant_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        include_self: bool,
    ) -> Result<Vec<M::ClosureModel>, ClosureTableError> {
        let mut query = M::ClosureEntity::find()
            .filter(M::closure_ancestor_column().eq(M::closure_id_to_value(id)));

        if !include_self {
            query = query.filter(M::closure_depth_column().gt(0));
        }

        let rows = query
            .order_by_asc(M::closure_depth_column())
            .order_by_asc(M::closure_descendant_column())
            .all(conn)
            .await?;
        Ok(rows)
    }

    async fn ancestor_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        include_self: bool,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let rows = self.ancestor_rows(conn, id, include_self).await?;
        Ok(rows.iter().map(M::closure_model_ancestor).collect())
    }

    async fn descendant_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        include_self: bool,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let rows = self.descendant_rows(conn, id, include_self).await?;
        Ok(rows.iter().map(M::closure_model_descendant).collect())
    }

    /// Delete the edges of the cross product `ancestors x descendants`.
    async fn delete_edges<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestors: &[M::Id],
        descendants: &[M::Id],
    ) -> Result<u64, ClosureTableError> {
        let ancestor_values = ancestors
            .iter()
            .map(M::closure_id_to_value)
            .collect::<Vec<_>>();

        let mut removed = 0;
        for batch in descendants.chunks(BATCH_SIZE) {
            removed += M::ClosureEntity::delete_many()
                .filter(M::closure_ancestor_column().is_in(ancestor_values.clone()))
                .filter(
                    M::closure_descendant_column()
                        .is_in(batch.iter().map(M::closure_id_to_value)),
                )
                .exec(conn)
                .await?
                .rows_affected;
        }
        Ok(removed)
    }

    /// Load node records for `ids`, keeping the order of `ids`.
    ///
    /// Keys without a record are skipped.
    async fn load_models<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[M::Id],
    ) -> Result<Vec<M>, ClosureTableError> {
        let mut by_id = HashMap::with_capacity(ids.len());
        for batch in ids.chunks(BATCH_SIZE) {
            let models = M::Entity::find()
                .filter(M::id_column().is_in(batch.iter().map(M::id_to_value)))
                .all(conn)
                .await?;
            by_id.extend(models.into_iter().map(|model| (model.id(), model)));
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}
