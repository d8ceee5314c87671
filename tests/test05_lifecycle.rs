use std::time::Duration;

use sql_conduit::test_utils::{sample_rows, StubPool};
use sql_conduit::{BindSet, Db, DriverErrorKind, Row, SqlConduitError};

#[tokio::test]
async fn wait_is_idempotent_across_concurrent_callers()
-> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::builder().connect_failures(2).build();
    let db = Db::builder(pool.clone())
        .retry_interval(Duration::from_millis(10))
        .build();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.wait().await;
        }));
    }
    for handle in handles {
        handle.await?;
    }

    // 2 scripted failures + 1 success, shared by every waiter.
    assert_eq!(pool.connect_attempts(), 3);
    assert_eq!(pool.connects(), 1);

    // A later wait observes the memoized outcome without reconnecting.
    db.wait().await;
    assert_eq!(pool.connect_attempts(), 3);
    Ok(())
}

#[tokio::test]
async fn operations_issued_before_readiness_simply_wait()
-> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::builder()
        .rows(sample_rows(3))
        .connect_failures(3)
        .build();
    let db = Db::builder(pool.clone())
        .retry_interval(Duration::from_millis(5))
        .build();

    // No explicit wait(): the first operation triggers the connect loop and
    // rides out the failures transparently.
    let rows: Vec<Row> = db
        .getall("SELECT * FROM test", BindSet::new(), Default::default())
        .await?;
    assert_eq!(rows.len(), 3);
    assert_eq!(pool.connect_attempts(), 4);
    Ok(())
}

#[tokio::test]
async fn close_waits_for_readiness_then_rejects_later_operations()
-> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::builder()
        .rows(sample_rows(1))
        .connect_failures(1)
        .build();
    let db = Db::builder(pool.clone())
        .retry_interval(Duration::from_millis(5))
        .build();

    db.close().await?;
    // close() cannot race the in-flight initial connect.
    assert_eq!(pool.connects(), 1);

    let err = db
        .getall::<Row>("SELECT * FROM test", BindSet::new(), Default::default())
        .await
        .unwrap_err();
    match err {
        SqlConduitError::Driver(e) => assert_eq!(e.kind(), DriverErrorKind::Closed),
        other => panic!("expected a closed-pool error, got {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn rawpool_is_readiness_gated() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::builder().connect_failures(1).build();
    let db = Db::builder(pool.clone())
        .retry_interval(Duration::from_millis(5))
        .build();

    let _raw = db.rawpool().await;
    assert_eq!(pool.connects(), 1);
    Ok(())
}
