use sql_conduit::test_utils::{sample_rows, ScriptedOutcome, StubPool};
use sql_conduit::{BindSet, Db, DriverError, QueryOptions, Row, RowValues, SqlConduitError};

fn db_with(pool: &StubPool) -> Db<StubPool> {
    Db::new(pool.clone())
}

#[tokio::test]
async fn getall_returns_every_row() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::builder().rows(sample_rows(1000)).build();
    let db = db_with(&pool);

    let rows: Vec<Row> = db
        .getall("SELECT * FROM test", BindSet::new(), QueryOptions::default())
        .await?;
    assert_eq!(rows.len(), 1000);
    assert_eq!(rows[0].get("name").and_then(|v| v.as_text()), Some("name 0"));
    Ok(())
}

#[tokio::test]
async fn getall_is_empty_when_no_rows_match() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::new();
    let db = db_with(&pool);

    let rows: Vec<Row> = db
        .getall(
            "SELECT * FROM test WHERE name=@name",
            BindSet::new().with("name", "nope"),
            QueryOptions::default(),
        )
        .await?;
    assert!(rows.is_empty());
    Ok(())
}

#[tokio::test]
async fn getrow_takes_the_first_row_or_none() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::builder().rows(sample_rows(3)).build();
    let db = db_with(&pool);

    let row: Option<Row> = db
        .getrow("SELECT * FROM test", BindSet::new(), QueryOptions::default())
        .await?;
    assert_eq!(
        row.as_ref().and_then(|r| r.get("name")).and_then(|v| v.as_text()),
        Some("name 0")
    );

    pool.script(ScriptedOutcome::Rows(Vec::new()));
    let row: Option<Row> = db
        .getrow("SELECT * FROM test", BindSet::new(), QueryOptions::default())
        .await?;
    assert!(row.is_none());
    Ok(())
}

#[tokio::test]
async fn getval_and_getvals_take_the_first_column() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::builder().rows(sample_rows(5)).build();
    let db = db_with(&pool);

    let id: Option<i64> = db
        .getval("SELECT id FROM test", BindSet::new(), QueryOptions::default())
        .await?;
    assert_eq!(id, Some(1));

    let ids: Vec<i64> = db
        .getvals("SELECT id FROM test", BindSet::new(), QueryOptions::default())
        .await?;
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[tokio::test]
async fn execute_succeeds_without_a_result() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::new();
    let db = db_with(&pool);

    db.execute(
        "CREATE TABLE test (id INT NOT NULL IDENTITY PRIMARY KEY, name VARCHAR(100))",
        BindSet::new(),
        QueryOptions::default(),
    )
    .await?;
    assert_eq!(pool.executed_sql().len(), 1);
    Ok(())
}

#[tokio::test]
async fn update_reports_first_statement_count() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::new();
    let db = db_with(&pool);

    pool.script(ScriptedOutcome::Affected(vec![3, 7]));
    let affected = db
        .update(
            "UPDATE test SET name=@newname WHERE name=@existing",
            BindSet::new().with("newname", "name 1002").with("existing", "name 999"),
            QueryOptions::default(),
        )
        .await?;
    assert_eq!(affected, 3);
    Ok(())
}

#[tokio::test]
async fn insert_appends_identity_clause_and_returns_id() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::new();
    let db = db_with(&pool);

    pool.script(ScriptedOutcome::Rows(vec![Row::from_pairs([(
        "id",
        RowValues::Int(42),
    )])]));
    let id = db
        .insert(
            "INSERT INTO test (name) VALUES (@name)",
            BindSet::new().with("name", "name 2000"),
            QueryOptions::default(),
        )
        .await?;
    assert_eq!(id, 42);

    let executed = pool.executed_sql();
    assert_eq!(
        executed.last().map(String::as_str),
        Some("INSERT INTO test (name) VALUES (@name); SELECT SCOPE_IDENTITY() AS id")
    );
    Ok(())
}

#[tokio::test]
async fn insert_without_identity_is_an_error() {
    let pool = StubPool::new();
    let db = db_with(&pool);

    // No row back at all.
    pool.script(ScriptedOutcome::Rows(Vec::new()));
    let err = db
        .insert("INSERT INTO t2 SELECT * FROM t1", BindSet::new(), QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SqlConduitError::NoIdentity));

    // A NULL identity readback means the same thing.
    pool.script(ScriptedOutcome::Rows(vec![Row::from_pairs([(
        "id",
        RowValues::Null,
    )])]));
    let err = db
        .insert("INSERT INTO t2 SELECT * FROM t1", BindSet::new(), QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SqlConduitError::NoIdentity));
}

#[tokio::test]
async fn statement_errors_carry_sql_context_and_the_original_cause() {
    let pool = StubPool::new();
    let db = db_with(&pool);

    pool.script(ScriptedOutcome::Error(DriverError::statement(
        "Invalid object name 'test3'",
    )));
    let err = db
        .getall::<Row>("SELECT * FROM test3", BindSet::new(), QueryOptions::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("SELECT * FROM test3"));
    let source = std::error::Error::source(&err).expect("source preserved");
    assert!(source.to_string().contains("Invalid object name"));
    assert!(!err.is_deadlock());
}

#[tokio::test]
async fn decode_mismatch_is_reported() {
    let pool = StubPool::builder().rows(sample_rows(1)).build();
    let db = db_with(&pool);

    let err = db
        .getval::<String>("SELECT id FROM test", BindSet::new(), QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SqlConduitError::Decode(_)));
}

#[tokio::test]
async fn in_clause_binds_flow_through_the_request() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::builder().rows(sample_rows(4)).build();
    let db = db_with(&pool);

    let mut binds = BindSet::new();
    let first = binds.in_clause(vec!["name 2".into(), "name 5".into()]);
    let second = binds.in_clause(vec!["name 8".into(), "name 9".into()]);
    let sql = format!("SELECT * FROM test WHERE name IN ({first}) OR name IN ({second})");

    let rows: Vec<Row> = db.getall(&sql, binds, QueryOptions::default()).await?;
    assert_eq!(rows.len(), 4);
    assert_eq!(
        pool.executed_sql().last().map(String::as_str),
        Some("SELECT * FROM test WHERE name IN (@0,@1) OR name IN (@2,@3)")
    );
    Ok(())
}

#[tokio::test]
async fn save_as_prepared_is_accepted_and_ignored() -> Result<(), Box<dyn std::error::Error>> {
    let pool = StubPool::builder().rows(sample_rows(1)).build();
    let db = db_with(&pool);

    let row: Option<Row> = db
        .getrow(
            "SELECT * FROM test WHERE name=@name",
            BindSet::new().with("name", "name 3"),
            QueryOptions::default().with_save_as_prepared(true),
        )
        .await?;
    assert!(row.is_some());
    Ok(())
}
