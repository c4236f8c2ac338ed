use templated_sql::prelude::*;

fn seeded() -> Result<SqliteConnection, SqlTemplateError> {
    let mut conn = SqliteConnection::open_with(SqliteOptions::in_memory())?;
    conn.query(
        "create table account (id integer primary key, owner text not null, balance integer not null);
         insert into account values (1, 'ada', 100), (2, 'bob', 50);",
    )
    .execute()?;
    Ok(conn)
}

fn balances(conn: &mut SqliteConnection) -> Result<Vec<i64>, SqlTemplateError> {
    conn.query("select balance from account order by id")
        .fetch_as::<i64>()?
        .collect()
}

#[test]
fn same_placeholder_in_each_fragment_binds_its_own_value() -> Result<(), SqlTemplateError> {
    let mut conn = seeded()?;
    let mut batch = TransactionBatch::new();
    batch
        .add_query(
            "update account set balance = balance - {{amount}} where id = {{id}};",
            &ParamMap::new().with("id", 1).with("amount", 30),
        )?
        .add_query(
            "update account set balance = balance + {{amount}} where id = {{id}};",
            &ParamMap::new().with("id", 2).with("amount", 30),
        )?;
    assert_eq!(batch.len(), 2);

    batch.execute(&mut conn)?;
    assert!(batch.is_empty());
    assert_eq!(balances(&mut conn)?, vec![70, 80]);
    Ok(())
}

#[test]
fn fragments_need_no_terminator() -> Result<(), SqlTemplateError> {
    let mut conn = seeded()?;
    let mut batch = TransactionBatch::new();
    batch
        .add_query(
            "insert into account values ({{id}}, {{owner}}, 1)",
            &ParamMap::new().with("id", 3).with("owner", "cy"),
        )?
        .add_query(
            "insert into account values ({{id}}, {{owner}}, 2) -- trailing note",
            &ParamMap::new().with("id", 4).with("owner", "di"),
        )?
        .add_query(
            "update account set balance = balance + 1 where id = {{id}}",
            &ParamMap::new().with("id", 1),
        )?;
    batch.execute(&mut conn)?;
    assert_eq!(balances(&mut conn)?, vec![101, 50, 1, 2]);
    Ok(())
}

#[test]
fn a_failing_fragment_rolls_back_the_whole_batch() -> Result<(), SqlTemplateError> {
    let mut conn = seeded()?;
    let mut batch = TransactionBatch::new();
    batch
        .add_query(
            "update account set balance = 0 where id = {{id}};",
            &ParamMap::new().with("id", 1),
        )?
        .add_query(
            "insert into account (id, owner, balance) values ({{id}}, {{owner}}, 1);",
            &ParamMap::new().with("id", 3),
        )?;

    let err = batch.execute(&mut conn).unwrap_err();
    assert!(matches!(err.root(), SqlTemplateError::Sqlite(_)), "{err}");
    assert!(batch.is_empty());
    assert_eq!(balances(&mut conn)?, vec![100, 50]);

    // Back in autocommit: a fresh BEGIN must not nest.
    batch.add_query(
        "update account set balance = {{balance}} where id = {{id}};",
        &ParamMap::new().with("id", 2).with("balance", 7),
    )?;
    batch.execute(&mut conn)?;
    assert_eq!(balances(&mut conn)?, vec![100, 7]);
    Ok(())
}

#[test]
fn numbering_restarts_on_every_execution() {
    let mut conn = SqliteConnection::new(SqliteOptions::in_memory());
    let mut batch = TransactionBatch::new();

    for _ in 0..2 {
        batch
            .add_query(
                "insert into nowhere values ({{id}});",
                &ParamMap::new().with("id", 9),
            )
            .expect("fragment accepted");
        let message = batch.execute(&mut conn).unwrap_err().to_string();
        assert!(message.contains("values (@qp_1_id)"), "{message}");
        assert!(message.contains("@qp_1_id = 9"), "{message}");
        assert!(!message.contains("@qp_2_"), "{message}");
    }
}

#[test]
fn batches_can_return_rows() -> Result<(), SqlTemplateError> {
    #[derive(Debug, Default, PartialEq)]
    struct Account {
        id: i64,
        owner: String,
        balance: i64,
    }
    impl_record!(Account {
        id: i64,
        owner: String,
        balance: i64,
    });

    let mut conn = seeded()?;
    let mut batch = TransactionBatch::new();
    batch
        .add_query(
            "insert into account values ({{id}}, {{owner}}, {{balance}});",
            &ParamMap::new().with("id", 3).with("owner", "cy").with("balance", 5),
        )?
        .add_query(
            "select id, owner, balance from account where balance < {{limit}} order by id;",
            &ParamMap::new().with("limit", 60),
        )?;

    let rows: Vec<Account> = batch
        .execute_query_as::<Account>(&mut conn)?
        .collect::<Result<_, _>>()?;
    assert_eq!(
        rows,
        vec![
            Account {
                id: 2,
                owner: "bob".into(),
                balance: 50,
            },
            Account {
                id: 3,
                owner: "cy".into(),
                balance: 5,
            },
        ]
    );

    batch.add_query("select owner from account where id = {{id}};", &ParamMap::new().with("id", 1))?;
    let dynamic: Vec<DynamicRecord> = batch
        .execute_query(&mut conn)?
        .collect::<Result<_, _>>()?;
    assert_eq!(dynamic[0].get("OWNER"), Some(&SqlValue::Text("ada".into())));
    Ok(())
}

#[test]
fn custom_templates_wrap_the_fragments() -> Result<(), SqlTemplateError> {
    let mut conn = seeded()?;
    let mut batch = TransactionBatch::with_templates("SAVEPOINT batch;", "RELEASE batch;");
    batch.add_query_with(
        "update account set owner = $owner$ where id = $id$;",
        &ParamMap::new().with("id", 1).with("owner", "ada lovelace"),
        Markers::new("$", "$"),
    )?;
    batch.execute(&mut conn)?;

    let owner: Option<String> = conn
        .query("select owner from account where id = 1")
        .fetch_as::<String>()?
        .next()
        .transpose()?;
    assert_eq!(owner.as_deref(), Some("ada lovelace"));
    Ok(())
}
