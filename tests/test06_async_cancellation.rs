use std::time::Duration;

use templated_sql::prelude::*;

const ENDLESS: &str = "with recursive c(x) as (select 1 union all select x + 1 from c) select x from c";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test(flavor = "current_thread")]
async fn async_reads_collect_every_row() -> Result<(), SqlTemplateError> {
    init_tracing();
    let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
    conn.query("create table t (v integer); insert into t values (1), (2), (3);")
        .execute_async(None)
        .await?;

    let values: Vec<i64> = conn
        .query("select v from t where v >= {{low}} order by v")
        .params(&ParamMap::new().with("low", 2))
        .fetch_as_async::<i64>(None)
        .await?
        .try_collect()
        .await?;
    assert_eq!(values, vec![2, 3]);

    let records = conn
        .query("select v from t order by v desc")
        .fetch_async(None)
        .await?
        .try_collect()
        .await?;
    assert_eq!(records[0].get("v"), Some(&SqlValue::Int(3)));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn pre_cancelled_token_fails_without_running() -> Result<(), SqlTemplateError> {
    init_tracing();
    let mut conn = SqliteConnection::open_with(SqliteOptions::in_memory())?;
    conn.query("create table t (v integer)").execute_async(None).await?;

    let token = CancellationToken::new();
    token.cancel();
    let err = conn
        .query("insert into t values (1)")
        .execute_async(Some(&token))
        .await
        .unwrap_err();
    assert!(err.is_cancelled(), "{err}");

    let count: Vec<i64> = conn
        .query("select count(*) from t")
        .fetch_as_async::<i64>(None)
        .await?
        .try_collect()
        .await?;
    assert_eq!(count, vec![0]);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn cancelling_mid_read_ends_the_stream() -> Result<(), SqlTemplateError> {
    init_tracing();
    let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
    let token = CancellationToken::new();

    {
        let mut rows = conn
            .query(ENDLESS)
            .fetch_as_async::<i64>(Some(&token))
            .await?;
        assert_eq!(rows.next().await.transpose()?, Some(1));
        assert_eq!(rows.next().await.transpose()?, Some(2));

        token.cancel();
        let err = rows.next().await.expect("cancellation surfaces").unwrap_err();
        assert!(err.is_cancelled(), "{err}");
        assert!(rows.next().await.is_none());
    }

    assert!(conn.is_open());
    let after: Vec<i64> = conn
        .query("select 42")
        .fetch_as_async::<i64>(None)
        .await?
        .try_collect()
        .await?;
    assert_eq!(after, vec![42]);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn timeout_interrupts_a_long_statement() -> Result<(), SqlTemplateError> {
    init_tracing();
    let mut conn = SqliteConnection::new(SqliteOptions::in_memory());

    let err = conn
        .query(format!("select count(*) from ({ENDLESS})"))
        .options(QueryOptions::default().with_timeout(Duration::from_millis(100)))
        .fetch_as_async::<i64>(None)
        .await
        .err()
        .expect("query should time out");
    assert!(err.is_cancelled(), "{err}");
    assert!(matches!(err, SqlTemplateError::Execution { .. }));

    let after: Vec<i64> = conn
        .query("select 7")
        .fetch_as_async::<i64>(None)
        .await?
        .try_collect()
        .await?;
    assert_eq!(after, vec![7]);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn cancellation_with_close_on_exit_closes() -> Result<(), SqlTemplateError> {
    init_tracing();
    let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
    let token = CancellationToken::new();

    let mut rows = conn
        .query(ENDLESS)
        .close_on_exit(true)
        .fetch_async(Some(&token))
        .await?;
    assert!(rows.next().await.is_some());
    token.cancel();
    assert!(rows.next().await.is_some_and(|row| row.is_err()));
    drop(rows);

    assert!(!conn.is_open());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn cancelled_batch_commits_nothing() -> Result<(), SqlTemplateError> {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("batch.db");
    let mut conn = SqliteConnection::open_with(SqliteOptions::new(path.to_string_lossy()))?;
    conn.query("create table log (n integer)").execute_async(None).await?;

    let token = CancellationToken::new();
    let mut batch = TransactionBatch::new();
    batch
        .add_query("insert into log values ({{n}});", &ParamMap::new().with("n", 1))?
        .add_query(&format!("{ENDLESS};"), &ParamMap::new())?
        .add_query("insert into log values ({{n}});", &ParamMap::new().with("n", 2))?;

    {
        let mut rows = batch.execute_query_async(&mut conn, Some(&token)).await?;
        assert!(rows.next().await.is_some());
        token.cancel();
        let err = rows.next().await.expect("cancellation surfaces").unwrap_err();
        assert!(err.is_cancelled());
    }
    assert!(batch.is_empty());

    let logged: Vec<i64> = conn
        .query("select n from log")
        .fetch_as_async::<i64>(None)
        .await?
        .try_collect()
        .await?;
    assert!(logged.is_empty(), "{logged:?}");

    batch.add_query("insert into log values ({{n}});", &ParamMap::new().with("n", 3))?;
    batch.execute_async(&mut conn, None).await?;
    let logged: Vec<i64> = conn
        .query("select n from log")
        .fetch_as_async::<i64>(None)
        .await?
        .try_collect()
        .await?;
    assert_eq!(logged, vec![3]);
    Ok(())
}
