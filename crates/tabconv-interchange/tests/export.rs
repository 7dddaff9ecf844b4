//! End-to-end export jobs against a mock connection

mod common;

use std::fs;
use std::io::Read;
use std::sync::Arc;

use common::{
    MockConnection, MockTable, SharedBuffer, count_result, initialize_logging, result,
};
use pretty_assertions::assert_eq;
use tabconv_core::{ForeignKeyAction, ForeignKeyInfo, Value};
use tabconv_interchange::{
    ExportError, ExportJob, ExportOptions, ExportPhase, ExportTarget, LobOptions, OutputTarget,
};
use tokio_util::sync::CancellationToken;

fn people_table() -> MockTable {
    MockTable::new("people", &[("name", "TEXT"), ("id", "INTEGER"), ("age", "INTEGER")])
        .with_primary_key(&["id"])
}

fn people_rows() -> tabconv_core::QueryResult {
    result(
        &[("id", "INTEGER"), ("age", "INTEGER"), ("name", "TEXT")],
        vec![
            vec![Value::Int64(1), Value::Int64(34), Value::String("Alice".into())],
            vec![Value::Int64(2), Value::Null, Value::String("Bob, Jr.".into())],
        ],
    )
}

fn people_connection(driver: &str) -> MockConnection {
    MockConnection::new(driver)
        .with_table(people_table())
        .with_count(2)
        .with_query_response("people", people_rows())
}

#[tokio::test]
async fn test_table_export_orders_key_columns_first() {
    initialize_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.csv");
    let conn = people_connection("sqlite").into_arc();

    let job = ExportJob::new(
        conn.clone(),
        ExportTarget::tables(["people"]),
        OutputTarget::File(path.clone()),
        ExportOptions::default(),
    )
    .unwrap();
    let summary = job.run().await.unwrap();

    assert_eq!(summary.total_rows, 2);
    assert!(!summary.cancelled);
    assert_eq!(summary.tables[0].output.as_deref(), Some(path.as_path()));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "id,age,name\n1,34,Alice\n2,,\"Bob, Jr.\"\n"
    );
    assert_eq!(
        conn.query_log(),
        vec![
            "SELECT COUNT(*) FROM \"people\"".to_string(),
            "SELECT \"id\", \"age\", \"name\" FROM \"people\" ORDER BY \"id\"".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_vendor_quoting_and_filter() {
    let dir = tempfile::tempdir().unwrap();
    let conn = people_connection("mysql").into_arc();

    let job = ExportJob::new(
        conn.clone(),
        ExportTarget::tables(["people"]),
        OutputTarget::File(dir.path().join("people.csv")),
        ExportOptions::default().with_filter("people", "age > 30"),
    )
    .unwrap();
    job.run().await.unwrap();

    assert_eq!(
        conn.query_log()[1],
        "SELECT `id`, `age`, `name` FROM `people` WHERE age > 30 ORDER BY `id`"
    );
}

#[tokio::test]
async fn test_zero_row_query_to_json_with_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    let log_path = dir.path().join("export.log");
    let conn = MockConnection::new("postgresql")
        .with_count(0)
        .with_query_response("FROM empty", result(&[("id", "INTEGER")], vec![]))
        .into_arc();

    let job = ExportJob::new(
        conn,
        ExportTarget::query("SELECT id FROM empty"),
        OutputTarget::File(path.clone()),
        ExportOptions::json().with_log(&log_path),
    )
    .unwrap();
    let summary = job.run().await.unwrap();

    assert_eq!(summary.total_rows, 0);
    assert_eq!(fs::read_to_string(&path).unwrap(), "[]\n");
    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("Export: query query"));
    assert!(log.contains("Total rows: 0"));
    assert!(log.contains("Exported lines: 0"));
    assert!(log.lines().last().unwrap().starts_with("Elapsed: "));
}

#[tokio::test]
async fn test_query_error_keeps_output_and_logs_error() {
    initialize_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("o.csv");
    let log_path = dir.path().join("export.log");
    let conn = MockConnection::new("sqlite")
        .with_failure_on("FROM bad")
        .into_arc();

    let job = ExportJob::new(
        conn,
        ExportTarget::query("SELECT * FROM bad"),
        OutputTarget::File(path.clone()),
        ExportOptions::default().with_log(&log_path),
    )
    .unwrap();
    match job.run().await {
        Err(ExportError::Query { context, .. }) => assert_eq!(context, "export of query"),
        other => panic!("expected a query error, got {other:?}"),
    }

    assert!(path.exists());
    assert_eq!(fs::read_to_string(&path).unwrap(), "");
    let log = fs::read_to_string(&log_path).unwrap();
    assert!(
        log.lines()
            .last()
            .unwrap()
            .starts_with("Error: Query error in export of query: ")
    );
}

#[tokio::test]
async fn test_console_json_tables_form_one_document() {
    let conn = MockConnection::new("sqlite")
        .with_table(people_table())
        .with_table(
            MockTable::new("pets", &[("owner_id", "INTEGER"), ("id", "INTEGER")])
                .with_primary_key(&["id"]),
        )
        .with_count(1)
        .with_query_response("\"people\"", people_rows())
        .with_query_response(
            "\"pets\"",
            result(
                &[("id", "INTEGER"), ("owner_id", "INTEGER")],
                vec![vec![Value::Int64(7), Value::Int64(1)]],
            ),
        )
        .into_arc();

    let console = SharedBuffer::default();
    let job = ExportJob::new(
        conn,
        ExportTarget::tables(["people", "pets"]),
        OutputTarget::Console,
        ExportOptions::json(),
    )
    .unwrap()
    .with_console_writer(Box::new(console.clone()));
    let summary = job.run().await.unwrap();
    assert_eq!(summary.total_rows, 3);

    let doc: serde_json::Value = serde_json::from_str(&console.contents()).unwrap();
    let object = doc.as_object().unwrap();
    let keys: Vec<&str> = object.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["people", "pets"]);
    assert_eq!(object["people"].as_array().unwrap().len(), 2);
    assert_eq!(object["people"][1]["name"], "Bob, Jr.");
    assert_eq!(object["pets"], serde_json::json!([{"id": 7, "owner_id": 1}]));
}

#[tokio::test]
async fn test_json_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.json");
    let conn = people_connection("sqlite").into_arc();

    let job = ExportJob::new(
        conn,
        ExportTarget::query("SELECT id, age, name FROM people"),
        OutputTarget::File(path.clone()),
        ExportOptions::json(),
    )
    .unwrap();
    job.run().await.unwrap();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "[\n  {\"id\":1,\"age\":34,\"name\":\"Alice\"},\n  {\"id\":2,\"age\":null,\"name\":\"Bob, Jr.\"}\n]\n"
    );
}

#[tokio::test]
async fn test_refuses_to_overwrite_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.csv");
    fs::write(&path, "precious").unwrap();
    let conn = people_connection("sqlite").into_arc();

    let job = ExportJob::new(
        conn,
        ExportTarget::tables(["people"]),
        OutputTarget::File(path.clone()),
        ExportOptions::default(),
    )
    .unwrap();
    let err = job.run().await.unwrap_err();

    assert!(matches!(err, ExportError::OutputExists(p) if p == path));
    assert_eq!(fs::read_to_string(&path).unwrap(), "precious");
}

#[tokio::test]
async fn test_invalid_jobs_are_rejected() {
    let conn = people_connection("sqlite").into_arc();
    let invalid = |target, output, options| {
        matches!(
            ExportJob::new(conn.clone(), target, output, options),
            Err(ExportError::InvalidJob(_))
        )
    };

    assert!(invalid(
        ExportTarget::query("  "),
        OutputTarget::Console,
        ExportOptions::default()
    ));
    assert!(invalid(
        ExportTarget::tables(["people", "pets"]),
        OutputTarget::File("out.csv".into()),
        ExportOptions::default()
    ));
    assert!(invalid(
        ExportTarget::query("SELECT 1"),
        OutputTarget::Console,
        ExportOptions {
            zip: true,
            ..Default::default()
        }
    ));
    assert!(invalid(
        ExportTarget::query("SELECT 1"),
        OutputTarget::Console,
        ExportOptions {
            beautify: true,
            ..ExportOptions::json()
        }
    ));
    assert!(invalid(
        ExportTarget::query("SELECT 1"),
        OutputTarget::Console,
        ExportOptions::structure_only()
    ));
}

#[tokio::test]
async fn test_directory_target_writes_file_per_table() {
    let dir = tempfile::tempdir().unwrap();
    let conn = MockConnection::new("sqlite")
        .with_table(people_table())
        .with_table(
            MockTable::new("pets", &[("owner_id", "INTEGER"), ("id", "INTEGER")])
                .with_primary_key(&["id"]),
        )
        .with_table(MockTable::new("audit", &[("entry", "TEXT")]))
        .with_count(1)
        .with_query_response("\"people\"", people_rows())
        .with_query_response(
            "\"pets\"",
            result(
                &[("id", "INTEGER"), ("owner_id", "INTEGER")],
                vec![vec![Value::Int64(7), Value::Int64(1)]],
            ),
        )
        .into_arc();

    let options = ExportOptions {
        exclude_tables: vec!["audit".into()],
        ..Default::default()
    };
    let job = ExportJob::new(
        conn.clone(),
        ExportTarget::Tables(Vec::new()),
        OutputTarget::Directory(dir.path().to_path_buf()),
        options,
    )
    .unwrap();
    let summary = job.run().await.unwrap();

    assert_eq!(summary.total_rows, 3);
    let names: Vec<&str> = summary.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["people", "pets"]);

    let mut files: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files.len(), 2);
    assert!(files[0].starts_with("people_") && files[0].ends_with(".csv"));
    assert!(files[1].starts_with("pets_") && files[1].ends_with(".csv"));
    assert_eq!(
        fs::read_to_string(dir.path().join(&files[1])).unwrap(),
        "id,owner_id\n7,1\n"
    );
    assert!(!conn.query_log().iter().any(|sql| sql.contains("audit")));
}

#[tokio::test]
async fn test_cancel_before_first_row_discards_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.csv");
    let log_path = dir.path().join("export.log");
    let conn = people_connection("sqlite").into_arc();

    let token = CancellationToken::new();
    let trigger = token.clone();
    let job = ExportJob::new(
        conn,
        ExportTarget::tables(["people"]),
        OutputTarget::File(path.clone()),
        ExportOptions::default().with_log(&log_path),
    )
    .unwrap()
    .with_cancel_token(token)
    .with_progress_callback(Box::new(move |progress| {
        if progress.phase == ExportPhase::ExportingData {
            trigger.cancel();
        }
    }));
    let summary = job.run().await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.total_rows, 0);
    assert_eq!(summary.tables[0].output, None);
    assert!(!path.exists());
    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("Cancelled"));
    assert!(log.contains("Exported lines: 0"));
}

#[tokio::test]
async fn test_cancel_midway_keeps_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("numbers.csv");
    let rows = (0..2500).map(|n| vec![Value::Int64(n)]).collect();
    let conn = MockConnection::new("sqlite")
        .with_count(2500)
        .with_query_response("numbers", result(&[("n", "INTEGER")], rows))
        .into_arc();

    let token = CancellationToken::new();
    let trigger = token.clone();
    let job = ExportJob::new(
        conn,
        ExportTarget::query("SELECT n FROM numbers"),
        OutputTarget::File(path.clone()),
        ExportOptions::default(),
    )
    .unwrap()
    .with_cancel_token(token)
    .with_progress_callback(Box::new(move |progress| {
        if progress.rows_exported >= 1000 {
            trigger.cancel();
        }
    }));
    let handle = job.spawn();
    let summary = handle.join().await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.total_rows, 1000);
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 1001);
    assert_eq!(text.lines().last(), Some("999"));
}

#[tokio::test]
async fn test_failed_count_leaves_total_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("export.log");
    let conn = MockConnection::new("sqlite")
        .with_failure_on("COUNT(*)")
        .with_query_response(
            "SELECT 1 AS one",
            result(&[("one", "INTEGER")], vec![vec![Value::Int64(1)]]),
        )
        .into_arc();

    let progress = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = progress.clone();
    let job = ExportJob::new(
        conn,
        ExportTarget::query("SELECT 1 AS one"),
        OutputTarget::File(dir.path().join("one.csv")),
        ExportOptions::default().with_log(&log_path),
    )
    .unwrap()
    .with_progress_callback(Box::new(move |p| seen.lock().push((p.phase, p.total_rows))));
    let summary = job.run().await.unwrap();

    assert_eq!(summary.total_rows, 1);
    assert!(fs::read_to_string(&log_path).unwrap().contains("Total rows: unknown"));
    let progress = progress.lock();
    assert_eq!(progress.first(), Some(&(ExportPhase::Starting, None)));
    assert!(progress.contains(&(ExportPhase::ExportingData, None)));
    assert_eq!(progress.last().map(|p| p.0), Some(ExportPhase::Complete));
}

#[tokio::test]
async fn test_row_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.csv");
    let conn = people_connection("sqlite").into_arc();

    let job = ExportJob::new(
        conn,
        ExportTarget::tables(["people"]),
        OutputTarget::File(path.clone()),
        ExportOptions::default().with_limit(1),
    )
    .unwrap();
    let summary = job.run().await.unwrap();

    assert_eq!(summary.total_rows, 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), "id,age,name\n1,34,Alice\n");
}

#[tokio::test]
async fn test_large_objects_written_to_side_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docs.csv");
    let conn = MockConnection::new("sqlite")
        .with_count(2)
        .with_query_response(
            "FROM docs",
            result(
                &[("id", "INTEGER"), ("body", "BLOB")],
                vec![
                    vec![Value::Int64(1), Value::Bytes(vec![0, 1, 2, 255])],
                    vec![Value::Int64(2), Value::Null],
                ],
            ),
        )
        .into_arc();

    let options = ExportOptions {
        lob: LobOptions {
            externalize: true,
            zip: false,
        },
        write_headers: false,
        ..Default::default()
    };
    let job = ExportJob::new(
        conn,
        ExportTarget::query("SELECT id, body FROM docs"),
        OutputTarget::File(path.clone()),
        options,
    )
    .unwrap();
    job.run().await.unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    let side_name = lines[0].strip_prefix("1,").unwrap();
    assert!(side_name.starts_with("docs_") && side_name.ends_with(".blob"));
    assert_eq!(fs::read(dir.path().join(side_name)).unwrap(), vec![0, 1, 2, 255]);
    assert_eq!(lines[1], "2,");
}

#[tokio::test]
async fn test_beautified_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aligned.csv");
    let conn = MockConnection::new("sqlite")
        .with_count(2)
        .with_query_response(
            "FROM people",
            result(
                &[("id", "INTEGER"), ("name", "TEXT")],
                vec![
                    vec![Value::Int64(1), Value::String("Al".into())],
                    vec![Value::Int64(100), Value::String("Bo".into())],
                ],
            ),
        )
        .into_arc();

    let options = ExportOptions {
        beautify: true,
        ..Default::default()
    };
    let job = ExportJob::new(
        conn,
        ExportTarget::query("SELECT id, name FROM people"),
        OutputTarget::File(path.clone()),
        options,
    )
    .unwrap();
    job.run().await.unwrap();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        " id,name\n  1,Al  \n100,Bo  \n"
    );
}

#[tokio::test]
async fn test_zip_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.csv.zip");
    let conn = people_connection("sqlite").into_arc();

    let options = ExportOptions {
        zip: true,
        ..Default::default()
    };
    let job = ExportJob::new(
        conn,
        ExportTarget::tables(["people"]),
        OutputTarget::File(path.clone()),
        options,
    )
    .unwrap();
    job.run().await.unwrap();

    let mut archive = zip::ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(archive.len(), 1);
    let mut entry = archive.by_index(0).unwrap();
    assert_eq!(entry.name(), "people.csv");
    let mut text = String::new();
    entry.read_to_string(&mut text).unwrap();
    assert!(text.starts_with("id,age,name\n1,34,Alice\n"));
}

#[tokio::test]
async fn test_structure_only_dump() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pets.txt");
    let pets = MockTable::new("pets", &[("id", "INTEGER"), ("owner_id", "INTEGER")])
        .with_primary_key(&["id"])
        .with_foreign_key(ForeignKeyInfo {
            name: "fk_owner".into(),
            columns: vec!["owner_id".into()],
            referenced_table: "people".into(),
            referenced_schema: None,
            referenced_columns: vec!["id".into()],
            on_update: ForeignKeyAction::NoAction,
            on_delete: ForeignKeyAction::Cascade,
        });
    let conn = MockConnection::new("sqlite").with_table(pets).into_arc();

    let job = ExportJob::new(
        conn.clone(),
        ExportTarget::tables(["pets"]),
        OutputTarget::File(path.clone()),
        ExportOptions::structure_only(),
    )
    .unwrap();
    let summary = job.run().await.unwrap();

    assert_eq!(summary.total_rows, 0);
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("Table: pets\nColumns:\n  id INTEGER\n  owner_id INTEGER\n"));
    assert!(text.contains("Primary key: id\n"));
    assert!(text.contains("fk_owner (owner_id) -> people (id)"));
    assert!(conn.query_log().is_empty());
}

#[tokio::test]
async fn test_without_introspection_selects_everything() {
    let dir = tempfile::tempdir().unwrap();
    let conn = people_connection("sqlite")
        .without_introspection()
        .into_arc();

    let job = ExportJob::new(
        conn.clone(),
        ExportTarget::tables(["people"]),
        OutputTarget::File(dir.path().join("people.csv")),
        ExportOptions::default(),
    )
    .unwrap();
    job.run().await.unwrap();
    assert_eq!(conn.query_log()[1], "SELECT * FROM \"people\"");

    let job = ExportJob::new(
        conn,
        ExportTarget::Tables(Vec::new()),
        OutputTarget::Directory(dir.path().to_path_buf()),
        ExportOptions::default(),
    )
    .unwrap();
    assert!(matches!(
        job.run().await,
        Err(ExportError::SchemaIntrospectionNotSupported)
    ));
}

#[tokio::test]
async fn test_progress_snapshot_after_run() {
    let dir = tempfile::tempdir().unwrap();
    let conn = MockConnection::new("sqlite")
        .with_query_response("COUNT(*)", count_result(2))
        .with_query_response("people", people_rows())
        .into_arc();

    let job = ExportJob::new(
        conn,
        ExportTarget::query("SELECT * FROM people"),
        OutputTarget::File(dir.path().join("people.csv")),
        ExportOptions::default(),
    )
    .unwrap();
    job.run().await.unwrap();

    let snapshot = job.progress();
    assert_eq!(snapshot.rows_exported, 2);
    assert_eq!(snapshot.tables_completed, 1);
    assert_eq!(snapshot.total_tables, 1);
    assert_eq!(snapshot.current_table_rows, Some(2));
}

#[tokio::test]
async fn test_handle_cancel_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.csv");
    let conn = people_connection("sqlite").into_arc();

    let job = ExportJob::new(
        conn,
        ExportTarget::tables(["people"]),
        OutputTarget::File(path.clone()),
        ExportOptions::default(),
    )
    .unwrap();
    let handle = job.spawn();
    handle.cancel();
    let summary = handle.join().await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.total_rows, 0);
    assert!(summary.tables.is_empty());
    assert!(!path.exists());
}
