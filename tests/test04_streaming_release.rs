use templated_sql::prelude::*;

const THOUSAND_ROWS: &str = "with recursive seq(n) as (select 1 union all select n + 1 from seq where n < 1000)
     select n from seq";

fn file_connection(dir: &tempfile::TempDir) -> SqliteConnection {
    let path = dir.path().join("stream.db");
    SqliteConnection::new(SqliteOptions::new(path.to_string_lossy()))
}

#[test]
fn abandoning_a_large_read_releases_and_closes() -> Result<(), SqlTemplateError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut conn = file_connection(&dir);

    {
        let mut rows = conn
            .query(THOUSAND_ROWS)
            .close_on_exit(true)
            .fetch_as::<i64>()?;
        assert_eq!(rows.next().transpose()?, Some(1));
    }
    assert!(!conn.is_open());

    let all: Vec<i64> = conn
        .query(THOUSAND_ROWS)
        .fetch_as::<i64>()?
        .collect::<Result<_, _>>()?;
    assert_eq!(all.len(), 1000);
    assert!(conn.is_open());
    Ok(())
}

#[test]
fn abandoned_reads_leave_the_connection_usable() -> Result<(), SqlTemplateError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut conn = file_connection(&dir);

    for _ in 0..3 {
        let mut rows = conn.query(THOUSAND_ROWS).fetch_as::<i64>()?;
        assert_eq!(rows.next().transpose()?, Some(1));
        assert_eq!(rows.next().transpose()?, Some(2));
        rows.close();
        assert!(conn.is_open());
    }

    let last: Option<i64> = conn
        .query(format!("select max(n) from ({THOUSAND_ROWS})"))
        .fetch_as::<Option<i64>>()?
        .next()
        .transpose()?
        .flatten();
    assert_eq!(last, Some(1000));
    Ok(())
}

#[test]
fn statements_after_the_cursor_still_run_when_abandoned() -> Result<(), SqlTemplateError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut conn = file_connection(&dir);
    conn.query("create table audit (note text)").execute()?;

    {
        let mut rows = conn
            .query(format!(
                "BEGIN;
                 {THOUSAND_ROWS};
                 insert into audit values ({{{{note}}}});
                 COMMIT;"
            ))
            .params(&ParamMap::new().with("note", "done"))
            .fetch_as::<i64>()?;
        assert_eq!(rows.next().transpose()?, Some(1));
    }

    let notes: Vec<String> = conn
        .query("select note from audit")
        .fetch_as::<String>()?
        .collect::<Result<_, _>>()?;
    assert_eq!(notes, vec!["done".to_owned()]);
    Ok(())
}

#[test]
fn rows_arrive_once_and_in_order() -> Result<(), SqlTemplateError> {
    let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
    let mut stream = conn.query(THOUSAND_ROWS).fetch_as::<i64>()?;
    let mut expected = 1;
    for row in stream.by_ref() {
        assert_eq!(row?, expected);
        expected += 1;
    }
    assert_eq!(expected, 1001);
    assert!(stream.next().is_none());
    Ok(())
}

#[test]
fn failed_start_with_close_on_exit_closes() {
    let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
    let err = conn
        .query("select * from absent")
        .close_on_exit(true)
        .fetch()
        .err()
        .expect("query should fail");
    assert!(matches!(err.root(), SqlTemplateError::Sqlite(_)));
    assert!(!conn.is_open());
}
