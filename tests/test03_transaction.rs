use sql_conduit::test_utils::{sample_rows, ScriptedOutcome, StubPool};
use sql_conduit::{
    BindSet, Db, DriverError, QueryOptions, Row, RowValues, SqlConduitError, TransactionOptions,
};

#[tokio::test]
async fn commits_what_happens_during_a_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::new();
    let db = Db::new(pool.clone());

    pool.script(ScriptedOutcome::Rows(vec![Row::from_pairs([(
        "id",
        RowValues::Int(7),
    )])]));
    let id = db
        .transaction(TransactionOptions::default(), |q| {
            Box::pin(async move {
                q.insert(
                    "INSERT INTO test (name) VALUES (@name)",
                    BindSet::new().with("name", "name 2000"),
                    QueryOptions::default(),
                )
                .await
            })
        })
        .await?;

    assert_eq!(id, 7);
    assert_eq!(pool.begins(), 1);
    assert_eq!(pool.commits(), 1);
    assert_eq!(pool.rollbacks(), 0);

    let executed = pool.executed_sql();
    assert_eq!(executed.first().map(String::as_str), Some("BEGIN TRANSACTION"));
    assert_eq!(executed.last().map(String::as_str), Some("COMMIT TRANSACTION"));
    Ok(())
}

#[tokio::test]
async fn rolls_back_when_the_unit_of_work_fails() {
    let pool = StubPool::new();
    let db = Db::new(pool.clone());

    pool.script(ScriptedOutcome::Error(DriverError::statement(
        "Violation of PRIMARY KEY constraint",
    )));
    let err = db
        .transaction(TransactionOptions::default(), |q| {
            Box::pin(async move {
                q.execute(
                    "INSERT INTO test (id, name) VALUES (@id, @name)",
                    BindSet::new().with("id", 1i64).with("name", "dup"),
                    QueryOptions::default(),
                )
                .await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("INSERT INTO test"));
    assert_eq!(pool.begins(), 1);
    assert_eq!(pool.commits(), 0);
    assert_eq!(pool.rollbacks(), 1);
}

#[tokio::test]
async fn statements_run_in_program_order_on_one_connection()
-> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::builder().rows(sample_rows(1)).build();
    let db = Db::new(pool.clone());

    db.transaction(TransactionOptions::default(), |q| {
        Box::pin(async move {
            q.execute("UPDATE test SET name=@a", BindSet::new().with("a", "x"), QueryOptions::default())
                .await?;
            let _row: Option<Row> = q
                .getrow("SELECT * FROM test", BindSet::new(), QueryOptions::default())
                .await?;
            q.execute("DELETE FROM test", BindSet::new(), QueryOptions::default())
                .await?;
            Ok(())
        })
    })
    .await?;

    let executed = pool.executed_sql();
    assert_eq!(
        executed,
        vec![
            "BEGIN TRANSACTION".to_string(),
            "UPDATE test SET name=@a".to_string(),
            "SELECT * FROM test".to_string(),
            "DELETE FROM test".to_string(),
            "COMMIT TRANSACTION".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn deadlock_with_budget_retries_without_rollback() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::new();
    let db = Db::new(pool.clone());

    // First attempt is chosen as a victim; the second succeeds.
    pool.script(ScriptedOutcome::Error(
        DriverError::deadlock("Transaction was deadlocked on lock resources").with_code(1205),
    ));
    pool.script(ScriptedOutcome::Affected(vec![1]));

    db.transaction(TransactionOptions::default().with_retries(2), |q| {
        Box::pin(async move {
            q.execute(
                "UPDATE test SET name=@name",
                BindSet::new().with("name", "retry me"),
                QueryOptions::default(),
            )
            .await
        })
    })
    .await?;

    assert_eq!(pool.begins(), 2);
    assert_eq!(pool.commits(), 1);
    // The server already rolled the victim back; no ROLLBACK round trip.
    assert_eq!(pool.rollbacks(), 0);
    Ok(())
}

#[tokio::test]
async fn deadlock_budget_bounds_total_attempts() {
    let pool = StubPool::new();
    let db = Db::new(pool.clone());

    for _ in 0..5 {
        pool.script(ScriptedOutcome::Error(
            DriverError::deadlock("Transaction was deadlocked on lock resources").with_code(1205),
        ));
    }

    let err = db
        .transaction(TransactionOptions::default().with_retries(2), |q| {
            Box::pin(async move {
                q.execute("UPDATE test SET name=@n", BindSet::new().with("n", "x"), QueryOptions::default())
                    .await
            })
        })
        .await
        .unwrap_err();

    assert!(err.is_deadlock());
    // retries: 2 means at most 3 attempts in total.
    assert_eq!(pool.begins(), 3);
    assert_eq!(pool.commits(), 0);
    // The final deadlock has no budget left, so it takes the rollback path.
    assert_eq!(pool.rollbacks(), 1);
}

#[tokio::test]
async fn deadlock_without_budget_surfaces_immediately() {
    let pool = StubPool::new();
    let db = Db::new(pool.clone());

    pool.script(ScriptedOutcome::Error(
        DriverError::deadlock("Transaction was deadlocked on lock resources").with_code(1205),
    ));

    let err = db
        .transaction(TransactionOptions::default(), |q| {
            Box::pin(async move {
                q.execute("UPDATE test SET name=@n", BindSet::new().with("n", "x"), QueryOptions::default())
                    .await
            })
        })
        .await
        .unwrap_err();

    assert!(err.is_deadlock());
    assert_eq!(pool.begins(), 1);
}

#[tokio::test]
async fn non_driver_errors_roll_back_and_propagate() {
    let pool = StubPool::new();
    let db = Db::new(pool.clone());

    let err = db
        .transaction(TransactionOptions::default(), |_q| {
            Box::pin(async move {
                Err::<(), _>(SqlConduitError::Decode("consumer bailed out".into()))
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SqlConduitError::Decode(_)));
    assert_eq!(pool.rollbacks(), 1);
    assert_eq!(pool.commits(), 0);
}
