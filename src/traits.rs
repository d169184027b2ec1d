use std::fmt::Debug;
use std::hash::Hash;

use sea_orm::entity::prelude::DateTimeUtc;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, EntityTrait, FromQueryResult, IntoActiveModel, Value,
};

use crate::config::ClosureTableConfig;

/// Trait implemented by SeaORM `Model` types that participate in a closure table.
///
/// Implementations are normally provided by the `#[derive(ClosureTableModel)]` macro,
/// which wires the node entity to the entity holding its closure rows.
pub trait ClosureTableModel:
    Clone + Send + Sync + 'static + IntoActiveModel<Self::ActiveModel> + FromQueryResult
{
    type Entity: EntityTrait<Model = Self>;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity> + ActiveModelBehavior + Send;
    type Id: Clone + Debug + Eq + Hash + Send + Sync + 'static;

    type ClosureEntity: EntityTrait<Model = Self::ClosureModel>;
    type ClosureModel: Clone
        + Send
        + Sync
        + 'static
        + FromQueryResult
        + IntoActiveModel<Self::ClosureActiveModel>;
    type ClosureActiveModel: ActiveModelTrait<Entity = Self::ClosureEntity>
        + ActiveModelBehavior
        + Send;

    fn closure_table_config() -> &'static ClosureTableConfig;

    fn id(&self) -> Self::Id;
    fn id_to_value(id: &Self::Id) -> Value;

    fn version(&self) -> i32;
    /// Write the bookkeeping columns (`updated`, `version`) onto an active model.
    fn stamp(active: &mut Self::ActiveModel, updated: DateTimeUtc, version: i32);

    fn id_column() -> <Self::Entity as EntityTrait>::Column;
    fn version_column() -> <Self::Entity as EntityTrait>::Column;

    fn closure_ancestor_column() -> <Self::ClosureEntity as EntityTrait>::Column;
    fn closure_descendant_column() -> <Self::ClosureEntity as EntityTrait>::Column;
    fn closure_depth_column() -> <Self::ClosureEntity as EntityTrait>::Column;

    fn closure_id_to_value(id: &Self::Id) -> Value;
    fn closure_model_ancestor(model: &Self::ClosureModel) -> Self::Id;
    fn closure_model_descendant(model: &Self::ClosureModel) -> Self::Id;
    fn closure_model_depth(model: &Self::ClosureModel) -> i32;
    fn closure_build_row(
        ancestor: Self::Id,
        descendant: Self::Id,
        depth: i32,
    ) -> Self::ClosureActiveModel;
}
