// ABOUTME: End-to-end dump tests against an in-memory database
// ABOUTME: Covers DDL filtering, dump order, both output formats and failure handling

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use spanner_dump::config::OutputFormat;
use spanner_dump::dump::{DumpOptions, DumpStats, Dumper};
use spanner_dump::filters::TableFilter;
use spanner_dump::schema::{Column, TableDefinition};
use spanner_dump::source::{DdlSource, RowStream, SnapshotSource};
use spanner_dump::table_rules::TableRules;
use spanner_dump::value::{Row, Value};
use spanner_dump::DumpError;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
struct MemoryDatabase {
    ddl: Vec<String>,
    tables: Vec<TableDefinition>,
    rows: BTreeMap<String, Vec<Row>>,
    /// Fail a table's stream after this many rows.
    fail_after: Option<(String, usize)>,
    queries: Mutex<Vec<String>>,
}

impl MemoryDatabase {
    /// Users(UserId, Name) with child Orders(UserId, OrderId, Total).
    fn shop() -> Self {
        let mut rows = BTreeMap::new();
        rows.insert(
            "Users".to_string(),
            vec![
                Row::new(vec![Value::Int64(1), Value::from("Alice")]),
                Row::new(vec![Value::Int64(2), Value::from("Bob")]),
            ],
        );
        rows.insert(
            "Orders".to_string(),
            vec![Row::new(vec![
                Value::Int64(1),
                Value::Int64(10),
                Value::Float64(9.5),
            ])],
        );

        MemoryDatabase {
            ddl: vec![
                "CREATE TABLE Users (\n  UserId INT64 NOT NULL,\n  Name STRING(MAX),\n) PRIMARY KEY (UserId)".to_string(),
                "CREATE TABLE Orders (\n  UserId INT64 NOT NULL,\n  OrderId INT64 NOT NULL,\n  Total FLOAT64,\n) PRIMARY KEY (UserId, OrderId),\n  INTERLEAVE IN PARENT Users ON DELETE CASCADE".to_string(),
                "CREATE INDEX OrdersByTotal ON Orders(Total)".to_string(),
                "CREATE VIEW UserNames SQL SECURITY INVOKER AS SELECT Name FROM Users".to_string(),
            ],
            // Listed child first to show the dump order does not depend on it
            tables: vec![
                TableDefinition::new(
                    "Orders",
                    vec![
                        Column::new("UserId", "INT64"),
                        Column::new("OrderId", "INT64"),
                        Column::new("Total", "FLOAT64"),
                    ],
                )
                .interleaved_in("Users")
                .with_primary_key(["UserId", "OrderId"]),
                TableDefinition::new(
                    "Users",
                    vec![Column::new("UserId", "INT64"), Column::new("Name", "STRING(MAX)")],
                )
                .with_primary_key(["UserId"]),
            ],
            rows,
            ..Default::default()
        }
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

fn table_of(sql: &str) -> String {
    let start = sql.find("FROM `").map(|i| i + 6).unwrap_or(0);
    let rest = &sql[start..];
    rest[..rest.find('`').unwrap_or(rest.len())].to_string()
}

#[async_trait]
impl DdlSource for MemoryDatabase {
    async fn list_ddl_statements(&self) -> spanner_dump::Result<Vec<String>> {
        Ok(self.ddl.clone())
    }
}

#[async_trait]
impl SnapshotSource for MemoryDatabase {
    async fn list_table_definitions(&self) -> spanner_dump::Result<Vec<TableDefinition>> {
        Ok(self.tables.clone())
    }

    fn stream_rows(&self, sql: String) -> RowStream<'_> {
        let table = table_of(&sql);
        self.queries.lock().unwrap().push(sql);

        let rows = self.rows.get(&table).cloned().unwrap_or_default();
        let mut items: Vec<spanner_dump::Result<Row>> = rows.into_iter().map(Ok).collect();
        if let Some((failing, after)) = &self.fail_after {
            if *failing == table {
                items.truncate(*after);
                items.push(Err(DumpError::Api {
                    status: 503,
                    message: "UNAVAILABLE: stream reset".to_string(),
                }));
            }
        }
        stream::iter(items).boxed()
    }
}

fn options(format: OutputFormat, bulk_size: usize) -> DumpOptions {
    DumpOptions {
        bulk_size,
        format,
        ..Default::default()
    }
}

async fn run(
    db: &MemoryDatabase,
    options: DumpOptions,
    filter: TableFilter,
) -> (String, spanner_dump::Result<DumpStats>) {
    let mut dumper = Dumper::new(options, filter, Vec::new());
    let result = match dumper.dump_ddl(db).await {
        Ok(_) => dumper.dump_tables(db).await,
        Err(e) => Err(e),
    };
    let output = String::from_utf8(dumper.into_inner()).unwrap();
    (output, result)
}

#[tokio::test]
async fn test_full_dump_as_sql() {
    let db = MemoryDatabase::shop();
    let (output, result) = run(&db, options(OutputFormat::Sql, 100), TableFilter::all()).await;

    assert_eq!(result.unwrap(), DumpStats { tables: 2, rows: 3 });

    let expected_tail = "INSERT INTO `Users` (`UserId`, `Name`) VALUES (1, \"Alice\"), (2, \"Bob\");\n\
         INSERT INTO `Orders` (`UserId`, `OrderId`, `Total`) VALUES (1, 10, 9.5);\n";
    assert!(output.ends_with(expected_tail), "unexpected output:\n{}", output);

    for ddl in &db.ddl {
        assert!(output.contains(&format!("{};\n", ddl)));
    }
    // DDL is written in the order the database lists it, parents first
    let users = output.find("CREATE TABLE Users").unwrap();
    let orders = output.find("CREATE TABLE Orders").unwrap();
    let users_rows = output.find("INSERT INTO `Users`").unwrap();
    let orders_rows = output.find("INSERT INTO `Orders`").unwrap();
    assert!(users < orders);
    assert!(orders < users_rows);
    assert!(users_rows < orders_rows);
    let statements: Vec<&str> = output.lines().filter(|l| l.ends_with(';')).collect();
    assert_eq!(statements.len(), 6);
}

#[tokio::test]
async fn test_ddl_keeps_source_order() {
    let db = MemoryDatabase {
        ddl: vec![
            "CREATE TABLE B (Id INT64) PRIMARY KEY (Id)".to_string(),
            "CREATE TABLE A (Id INT64) PRIMARY KEY (Id)".to_string(),
        ],
        ..Default::default()
    };
    let mut dumper = Dumper::new(DumpOptions::default(), TableFilter::all(), Vec::new());
    assert_eq!(dumper.dump_ddl(&db).await.unwrap(), 2);
    assert_eq!(
        String::from_utf8(dumper.into_inner()).unwrap(),
        "CREATE TABLE B (Id INT64) PRIMARY KEY (Id);\nCREATE TABLE A (Id INT64) PRIMARY KEY (Id);\n"
    );
}

#[tokio::test]
async fn test_parents_are_dumped_before_children() {
    let db = MemoryDatabase::shop();
    let (output, _) = run(&db, options(OutputFormat::Sql, 1), TableFilter::all()).await;

    let last_user = output.rfind("INSERT INTO `Users`").unwrap();
    let first_order = output.find("INSERT INTO `Orders`").unwrap();
    assert!(last_user < first_order);
    assert_eq!(output.matches("INSERT INTO `Users`").count(), 2);
}

#[tokio::test]
async fn test_allow_list_filters_ddl_and_data() {
    let db = MemoryDatabase::shop();
    let (output, result) = run(
        &db,
        options(OutputFormat::Sql, 100),
        TableFilter::new(["Users"]),
    )
    .await;

    assert_eq!(result.unwrap(), DumpStats { tables: 1, rows: 2 });
    assert!(output.contains("CREATE TABLE Users"));
    assert!(output.contains("CREATE VIEW UserNames"));
    assert!(!output.contains("CREATE TABLE Orders"));
    assert!(!output.contains("OrdersByTotal"));
    assert!(!output.contains("INSERT INTO `Orders`"));
    assert_eq!(db.queries().len(), 1);
}

#[tokio::test]
async fn test_unknown_allow_list_entry_dumps_nothing() {
    let db = MemoryDatabase::shop();
    let (output, result) = run(
        &db,
        options(OutputFormat::Sql, 100),
        TableFilter::new(["Missing"]),
    )
    .await;

    assert_eq!(result.unwrap(), DumpStats::default());
    assert_eq!(output, "CREATE VIEW UserNames SQL SECURITY INVOKER AS SELECT Name FROM Users;\n");
}

#[tokio::test]
async fn test_json_lines() {
    let db = MemoryDatabase {
        ddl: Vec::new(),
        ..MemoryDatabase::shop()
    };
    let (output, result) = run(&db, options(OutputFormat::Json, 1), TableFilter::all()).await;
    result.unwrap();

    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(
        lines,
        vec![
            r#"{"UserId":"1","Name":"\"Alice\""}"#,
            r#"{"UserId":"2","Name":"\"Bob\""}"#,
            r#"{"UserId":"1","OrderId":"10","Total":"9.5"}"#,
        ]
    );
}

#[tokio::test]
async fn test_scenario_batches() {
    let mut rows = BTreeMap::new();
    rows.insert(
        "T".to_string(),
        (1..=3)
            .map(|i| Row::new(vec![Value::Int64(i), Value::Int64(i * 10)]))
            .collect(),
    );
    let db = MemoryDatabase {
        tables: vec![TableDefinition::new(
            "T",
            vec![Column::new("id", "INT64"), Column::new("n", "INT64")],
        )],
        rows,
        ..Default::default()
    };

    let (output, _) = run(&db, options(OutputFormat::Sql, 2), TableFilter::all()).await;
    assert_eq!(
        output,
        "INSERT INTO `T` (`id`, `n`) VALUES (1, 10), (2, 20);\n\
         INSERT INTO `T` (`id`, `n`) VALUES (3, 30);\n"
    );
}

#[tokio::test]
async fn test_stream_failure_stops_the_dump() {
    let mut rows = BTreeMap::new();
    rows.insert(
        "Users".to_string(),
        (1..=5)
            .map(|i| Row::new(vec![Value::Int64(i), Value::from("x")]))
            .collect(),
    );
    let db = MemoryDatabase {
        rows,
        fail_after: Some(("Users".to_string(), 3)),
        ..MemoryDatabase::shop()
    };

    let (output, result) = run(&db, options(OutputFormat::Sql, 2), TableFilter::all()).await;

    match result.unwrap_err() {
        DumpError::Table { table, source } => {
            assert_eq!(table, "Users");
            assert!(matches!(*source, DumpError::Api { status: 503, .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
    // Rows read before the failure are kept, later tables are not started
    assert!(output.contains("VALUES (1, \"x\"), (2, \"x\");\n"));
    assert!(output.contains("VALUES (3, \"x\");\n"));
    assert!(!output.contains("(4, \"x\")"));
    assert!(!output.contains("INSERT INTO `Orders`"));
    assert_eq!(db.queries().len(), 1);
}

#[tokio::test]
async fn test_decode_failure_names_table_and_column() {
    let mut rows = BTreeMap::new();
    rows.insert(
        "Users".to_string(),
        vec![Row::new(vec![Value::from("not a number"), Value::from("x")])],
    );
    let db = MemoryDatabase {
        rows,
        ..MemoryDatabase::shop()
    };

    let (_, result) = run(&db, options(OutputFormat::Sql, 10), TableFilter::all()).await;
    let err = result.unwrap_err();
    assert!(matches!(
        &err,
        DumpError::Table { table, source }
            if table == "Users" && matches!(**source, DumpError::Decode { ref column, .. } if column == "UserId")
    ));
}

#[tokio::test]
async fn test_predicates_and_ordering_reach_the_query() {
    let db = MemoryDatabase::shop();
    let mut rules = TableRules::default().with_global_predicate(Some("UserId > 0".to_string()));
    rules
        .add_table_filter("Orders".to_string(), "Total >= 5".to_string())
        .unwrap();

    let options = DumpOptions {
        rules,
        order_by_primary_key: true,
        ..Default::default()
    };
    let (_, result) = run(&db, options, TableFilter::all()).await;
    result.unwrap();

    assert_eq!(
        db.queries(),
        vec![
            "SELECT `UserId`, `Name` FROM `Users` WHERE UserId > 0 ORDER BY `UserId`".to_string(),
            "SELECT `UserId`, `OrderId`, `Total` FROM `Orders` WHERE (UserId > 0) AND (Total >= 5) ORDER BY `UserId`, `OrderId`"
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn test_empty_database() {
    let db = MemoryDatabase::default();
    let (output, result) = run(&db, options(OutputFormat::Json, 10), TableFilter::all()).await;
    assert_eq!(result.unwrap(), DumpStats::default());
    assert!(output.is_empty());
}
