mod common;

use common::{ids, seed_nodes, NodeRepository};
use sea_orm::{Database, DatabaseConnection};

/// PostgreSQL connection from `CLOSURE_TABLE_TEST_DATABASE_URL`, or `None` to skip.
async fn setup_database() -> Result<Option<DatabaseConnection>, sea_orm::DbErr> {
    match std::env::var("CLOSURE_TABLE_TEST_DATABASE_URL") {
        Ok(url) => Database::connect(url).await.map(Some),
        Err(_) => {
            eprintln!("CLOSURE_TABLE_TEST_DATABASE_URL not set; skipping PostgreSQL test");
            Ok(None)
        }
    }
}

#[tokio::test]
async fn move_and_delete_under_advisory_lock() -> Result<(), Box<dyn std::error::Error>> {
    let Some(db) = setup_database().await? else {
        return Ok(());
    };

    let repo = NodeRepository::new();
    repo.build_schema(&db).await?;
    seed_nodes(&db, &repo, 0..5).await?;

    repo.insert_root(&db, &0).await?;
    repo.insert_child(&db, &0, &1).await?;
    repo.insert_child(&db, &1, &2).await?;
    repo.insert_child(&db, &0, &3).await?;
    repo.insert_child(&db, &2, &4).await?;

    repo.move_subtree(&db, &2, &3).await?;
    assert_eq!(ids(&repo.ancestors(&db, &4).await?), vec![0, 3, 2]);
    assert!(repo.children(&db, &1).await?.is_empty());

    assert_eq!(repo.delete_subtree(&db, &3).await?, vec![2, 4]);
    assert_eq!(repo.descendant_depth(&db, &0).await?, Some(1));
    Ok(())
}
