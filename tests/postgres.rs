//! Postgres store tests. Need a live database (`DATABASE_URL`); run with `--features pg-tests`.
#![cfg(feature = "pg-tests")]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use grant_console::{
    ConsoleError, GrantConsole, MockMailer, MockReportGenerator, NewGrantRequest,
    PostgresRequestStore, RequestStatus, RequestStore, StatusUpdate, TestDbPools,
};

fn acme() -> NewGrantRequest {
    NewGrantRequest::from_form([
        ("name", "Acme"),
        ("amount", "5000"),
        ("recipient", "grants@acme.example"),
    ])
    .unwrap()
}

#[sqlx::test]
#[test_log::test]
async fn test_create_and_get_round_trip_fields(pool: sqlx::PgPool) {
    let store = PostgresRequestStore::new(pool);

    let created = store.create(acme()).await.unwrap();
    assert_eq!(created.status, RequestStatus::Created);

    let fetched = store.get(created.id).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.fields, created.fields);
    assert_eq!(fetched.recipient.as_deref(), Some("grants@acme.example"));
    assert!(fetched.file_path.is_none());
}

#[sqlx::test]
#[test_log::test]
async fn test_list_is_newest_first(pool: sqlx::PgPool) {
    let store = PostgresRequestStore::new(pool);
    let first = store.create(acme()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = store.create(acme()).await.unwrap();

    let ids: Vec<_> = store.list().await.unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[sqlx::test]
#[test_log::test]
async fn test_lifecycle_through_update_status(pool: sqlx::PgPool) {
    let store = PostgresRequestStore::new(pool);
    let request = store.create(acme()).await.unwrap();

    let running = store
        .update_status(request.id, StatusUpdate::Claim { run_at: Utc::now() })
        .await
        .unwrap();
    assert_eq!(running.status, RequestStatus::Running);

    let generated = store
        .update_status(
            request.id,
            StatusUpdate::Generated {
                file_path: PathBuf::from("/tmp/x.pdf"),
            },
        )
        .await
        .unwrap();
    assert_eq!(generated.file_path, Some(PathBuf::from("/tmp/x.pdf")));

    let delivered = store
        .update_status(
            request.id,
            StatusUpdate::Delivered {
                delivered_at: Utc::now(),
                recipient: "grants@acme.example".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(delivered.status, RequestStatus::Delivered);
    assert!(delivered.delivered_at.is_some());
    assert_eq!(store.get(request.id).await.unwrap(), delivered);

    // No regression back to created
    assert!(matches!(
        store.update_status(request.id, StatusUpdate::Release).await,
        Err(ConsoleError::InvalidTransition { .. })
    ));

    let archived = store
        .update_status(request.id, StatusUpdate::Archived)
        .await
        .unwrap();
    assert_eq!(archived.status, RequestStatus::Archived);
    assert_eq!(archived.file_path, delivered.file_path);
    assert_eq!(
        store.get(request.id).await.unwrap().delivered_to.as_deref(),
        Some("grants@acme.example")
    );
}

#[sqlx::test]
#[test_log::test]
async fn test_delete_then_not_found(pool: sqlx::PgPool) {
    let store = PostgresRequestStore::new(pool);
    let request = store.create(acme()).await.unwrap();

    store.delete(request.id).await.unwrap();
    assert!(matches!(
        store.get(request.id).await,
        Err(ConsoleError::RequestNotFound(_))
    ));
    assert!(matches!(
        store.update_status(request.id, StatusUpdate::Archived).await,
        Err(ConsoleError::RequestNotFound(_))
    ));
    assert!(matches!(
        store.delete(request.id).await,
        Err(ConsoleError::RequestNotFound(_))
    ));
}

#[sqlx::test]
#[test_log::test]
async fn test_release_stale_runs(pool: sqlx::PgPool) {
    let store = PostgresRequestStore::new(pool);
    let stale = store.create(acme()).await.unwrap();
    let fresh = store.create(acme()).await.unwrap();

    store
        .update_status(
            stale.id,
            StatusUpdate::Claim {
                run_at: Utc::now() - chrono::Duration::hours(1),
            },
        )
        .await
        .unwrap();
    store
        .update_status(fresh.id, StatusUpdate::Claim { run_at: Utc::now() })
        .await
        .unwrap();

    let released = store
        .release_stale_runs(Utc::now() - chrono::Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(released, 1);

    let stale = store.get(stale.id).await.unwrap();
    assert_eq!(stale.status, RequestStatus::Created);
    assert!(stale.run_at.is_none());
    assert_eq!(
        store.get(fresh.id).await.unwrap().status,
        RequestStatus::Running
    );
}

#[sqlx::test]
#[test_log::test]
async fn test_concurrent_runs_claim_once(pool: sqlx::PgPool) {
    let store = PostgresRequestStore::new(pool);
    let request = store.create(acme()).await.unwrap();

    let generator = MockReportGenerator::new();
    let trigger = generator.add_response_with_trigger(Ok(PathBuf::from("/tmp/x.pdf")));
    let console = GrantConsole::new(
        Arc::new(store.clone()),
        Arc::new(generator.clone()),
        Arc::new(MockMailer::new()),
    );

    let first = {
        let console = console.clone();
        tokio::spawn(async move { console.run(request.id).await })
    };
    // Wait until the first run holds the claim
    while store.get(request.id).await.unwrap().status != RequestStatus::Running {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(matches!(
        console.run(request.id).await,
        Err(ConsoleError::InvalidTransition { .. })
    ));

    trigger.send(()).unwrap();
    let generated = first.await.unwrap().unwrap();
    assert_eq!(generated.status, RequestStatus::Generated);
    assert_eq!(generator.call_count(), 1);
}

#[sqlx::test]
#[test_log::test]
async fn test_store_reads_through_replica_pool(pool: sqlx::PgPool) {
    let pools = TestDbPools::new(pool).await.unwrap();
    let store = PostgresRequestStore::new(pools);

    let request = store.create(acme()).await.unwrap();
    assert_eq!(store.list().await.unwrap().len(), 1);
    store
        .update_status(request.id, StatusUpdate::Archived)
        .await
        .unwrap();
}
