#![allow(dead_code)]

use closure_table::{ClosureTableError, ClosureTableRepository};
use sea_orm::{ActiveValue::Set, ConnectOptions, Database, DatabaseConnection, DbErr};
use serde_json::json;

pub mod entity {
    pub mod node {
        use closure_table::ClosureTableModelDerive as ClosureTableModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, ClosureTableModel)]
        #[sea_orm(table_name = "nodes")]
        #[closure_table(closure_module = "crate::common::entity::node_closure", entity_name = "Node")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: i32,
            pub updated: DateTimeUtc,
            pub version: i32,
            pub payload: Json,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod node_closure {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "node_closure")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub ancestor_id: i32,
            #[sea_orm(primary_key, auto_increment = false)]
            pub descendant_id: i32,
            pub depth: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod folder {
        use closure_table::ClosureTableModelDerive as ClosureTableModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, ClosureTableModel)]
        #[sea_orm(table_name = "folders")]
        #[closure_table(
            closure_module = "crate::common::entity::folder_path",
            entity_name = "Folder",
            closure_name = "FolderPath",
            id_field = "folder_id",
            updated_field = "modified_at",
            version_field = "revision",
            ancestor_field = "ancestor",
            descendant_field = "descendant",
            depth_field = "generations",
            dependent = "destroy"
        )]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub folder_id: i64,
            pub modified_at: DateTimeUtc,
            pub revision: i32,
            pub name: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod folder_path {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "folder_paths")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub ancestor: i64,
            #[sea_orm(primary_key, auto_increment = false)]
            pub descendant: i64,
            pub generations: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

pub type NodeRepository = ClosureTableRepository<entity::node::Model>;
pub type FolderRepository = ClosureTableRepository<entity::folder::Model>;

/// Single-connection in-memory SQLite database; every pooled connection would
/// otherwise open its own empty database.
pub async fn sqlite() -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    Database::connect(options).await
}

pub async fn seed_nodes(
    db: &DatabaseConnection,
    repo: &NodeRepository,
    ids: impl IntoIterator<Item = i32>,
) -> Result<(), ClosureTableError> {
    for id in ids {
        repo.insert_node(
            db,
            entity::node::ActiveModel {
                id: Set(id),
                payload: Set(json!({ "label": format!("node-{id}") })),
                ..Default::default()
            },
        )
        .await?;
    }
    Ok(())
}

/// Fresh schema holding the tree
///
/// ```text
///         0
///         1
///      2     3
///      4   5   6
///          7
/// ```
pub async fn fixture(db: &DatabaseConnection) -> Result<NodeRepository, ClosureTableError> {
    let repo = NodeRepository::new();
    repo.build_schema(db).await?;
    seed_nodes(db, &repo, 0..8).await?;

    repo.insert_root(db, &0).await?;
    for (parent, child) in [(0, 1), (1, 2), (1, 3), (2, 4), (3, 5), (3, 6), (5, 7)] {
        repo.insert_child(db, &parent, &child).await?;
    }
    Ok(repo)
}

pub fn ids(models: &[entity::node::Model]) -> Vec<i32> {
    models.iter().map(|model| model.id).collect()
}
