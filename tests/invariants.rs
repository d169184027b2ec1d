mod common;

use std::collections::BTreeMap;

use closure_table::ClosureTableError;
use common::{seed_nodes, sqlite, NodeRepository};
use proptest::prelude::*;
use sea_orm::DatabaseConnection;

const NODES: i32 = 8;

/// Reference forest: node -> parent, for every node currently in the tree.
#[derive(Default)]
struct Forest {
    parents: BTreeMap<i32, Option<i32>>,
}

impl Forest {
    fn contains(&self, id: i32) -> bool {
        self.parents.contains_key(&id)
    }

    fn parent(&self, id: i32) -> Option<i32> {
        self.parents.get(&id).copied().flatten()
    }

    fn path_to_root(&self, id: i32) -> Vec<i32> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            path.push(parent);
            current = parent;
        }
        path
    }

    fn is_in_subtree(&self, node: i32, root: i32) -> bool {
        self.path_to_root(node).contains(&root)
    }

    fn closure(&self) -> Vec<(i32, i32, i32)> {
        let mut edges = Vec::new();
        for &id in self.parents.keys() {
            for (depth, ancestor) in self.path_to_root(id).into_iter().enumerate() {
                edges.push((ancestor, id, depth as i32));
            }
        }
        edges.sort();
        edges
    }
}

#[derive(Clone, Debug)]
enum Op {
    Insert { node: i32, parent: i32 },
    Move { node: i32, parent: i32 },
    Unlink { node: i32 },
    DeleteSubtree { node: i32 },
}

fn op() -> impl Strategy<Value = Op> {
    let node = 0..NODES;
    prop_oneof![
        (node.clone(), 0..NODES).prop_map(|(node, parent)| Op::Insert { node, parent }),
        (node.clone(), 0..NODES).prop_map(|(node, parent)| Op::Move { node, parent }),
        node.clone().prop_map(|node| Op::Unlink { node }),
        node.prop_map(|node| Op::DeleteSubtree { node }),
    ]
}

async fn stored_closure(
    db: &DatabaseConnection,
    repo: &NodeRepository,
) -> Result<Vec<(i32, i32, i32)>, ClosureTableError> {
    let mut edges = repo
        .edges(db)
        .await?
        .into_iter()
        .map(|edge| (edge.ancestor, edge.descendant, edge.depth))
        .collect::<Vec<_>>();
    edges.sort();
    Ok(edges)
}

async fn apply(
    db: &DatabaseConnection,
    repo: &NodeRepository,
    forest: &mut Forest,
    op: &Op,
) -> Result<(), ClosureTableError> {
    match *op {
        Op::Insert { node, parent } => {
            if forest.contains(node) {
                let err = repo.insert_root(db, &node).await.unwrap_err();
                assert!(matches!(err, ClosureTableError::Invariant(_)), "{err}");
            } else if forest.contains(parent) {
                repo.insert_child(db, &parent, &node).await?;
                forest.parents.insert(node, Some(parent));
            } else {
                repo.insert_root(db, &node).await?;
                forest.parents.insert(node, None);
            }
        }
        Op::Move { node, parent } => {
            if !forest.contains(node) || !forest.contains(parent) {
                let err = repo.move_subtree(db, &node, &parent).await.unwrap_err();
                assert!(matches!(err, ClosureTableError::NotFound(_)), "{err}");
            } else if forest.is_in_subtree(parent, node) {
                let err = repo.move_subtree(db, &node, &parent).await.unwrap_err();
                assert!(matches!(err, ClosureTableError::Invariant(_)), "{err}");
            } else {
                repo.move_subtree(db, &node, &parent).await?;
                forest.parents.insert(node, Some(parent));
            }
        }
        Op::Unlink { node } => {
            if !forest.contains(node) {
                let err = repo.unlink(db, &node).await.unwrap_err();
                assert!(matches!(err, ClosureTableError::NotFound(_)), "{err}");
            } else if forest.parent(node).is_none() {
                let err = repo.unlink(db, &node).await.unwrap_err();
                assert!(matches!(err, ClosureTableError::Invariant(_)), "{err}");
            } else {
                repo.unlink(db, &node).await?;
                forest.parents.insert(node, None);
            }
        }
        Op::DeleteSubtree { node } => {
            if !forest.contains(node) {
                let err = repo.delete_subtree(db, &node).await.unwrap_err();
                assert!(matches!(err, ClosureTableError::NotFound(_)), "{err}");
            } else {
                let removed = repo.delete_subtree(db, &node).await?;
                let mut expected = forest
                    .parents
                    .keys()
                    .copied()
                    .filter(|&id| id != node && forest.is_in_subtree(id, node))
                    .collect::<Vec<_>>();
                let mut removed_sorted = removed.clone();
                removed_sorted.sort();
                expected.sort();
                assert_eq!(removed_sorted, expected);
                for id in removed {
                    forest.parents.remove(&id);
                }
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn closure_matches_reference_forest(ops in prop::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
        runtime.block_on(async {
            let db = sqlite().await.expect("sqlite");
            let repo = NodeRepository::new();
            repo.build_schema(&db).await.expect("schema");
            seed_nodes(&db, &repo, 0..NODES).await.expect("seed");

            let mut forest = Forest::default();
            for op in &ops {
                apply(&db, &repo, &mut forest, op).await.expect("operation");
                let stored = stored_closure(&db, &repo).await.expect("edges");
                assert_eq!(stored, forest.closure(), "after {op:?}");
            }

            let roots = repo
                .roots(&db)
                .await
                .expect("roots")
                .into_iter()
                .map(|node| node.id)
                .collect::<Vec<_>>();
            let expected_roots = forest
                .parents
                .iter()
                .filter(|(_, parent)| parent.is_none())
                .map(|(&id, _)| id)
                .collect::<Vec<_>>();
            assert_eq!(roots, expected_roots);
        });
    }
}
