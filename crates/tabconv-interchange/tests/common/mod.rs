//! Common test utilities and mocks

use async_trait::async_trait;
use std::sync::Arc;
use tabconv_core::{
    ColumnInfo, ColumnMeta, Connection, ForeignKeyInfo, PrimaryKeyInfo, QueryResult, Result,
    ResultSetCursor, RowCursor, SchemaIntrospection, TabconvError, TableInfo, Value,
};

/// A table as seen through schema introspection
#[derive(Clone)]
pub struct MockTable {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Option<PrimaryKeyInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl MockTable {
    /// Columns given as `(name, type)` in declaration order
    pub fn new(name: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns
                .iter()
                .enumerate()
                .map(|(i, (n, t))| ColumnInfo::new(*n, *t, i))
                .collect(),
            primary_key: None,
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(PrimaryKeyInfo {
            name: None,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKeyInfo) -> Self {
        self.foreign_keys.push(fk);
        self
    }
}

/// Mock connection for exercising export jobs without a real database.
///
/// Queries are answered by SQL pattern: the first registered pattern the
/// statement contains wins. A statement matching nothing fails.
pub struct MockConnection {
    pub driver: String,
    pub tables: Vec<MockTable>,
    pub introspection: bool,
    pub query_responses: Vec<(String, QueryResult)>,
    /// Statements containing any of these patterns fail
    pub failing_patterns: Vec<String>,
    /// Log of all SQL sent through `query` and `open_cursor`
    pub query_log: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl MockConnection {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            tables: Vec::new(),
            introspection: true,
            query_responses: Vec::new(),
            failing_patterns: Vec::new(),
            query_log: Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    pub fn with_table(mut self, table: MockTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn without_introspection(mut self) -> Self {
        self.introspection = false;
        self
    }

    /// Register a response for statements containing the given SQL pattern.
    pub fn with_query_response(
        mut self,
        sql_contains: impl Into<String>,
        result: QueryResult,
    ) -> Self {
        self.query_responses.push((sql_contains.into(), result));
        self
    }

    /// Fail every statement containing the given SQL pattern.
    pub fn with_failure_on(mut self, sql_contains: impl Into<String>) -> Self {
        self.failing_patterns.push(sql_contains.into());
        self
    }

    /// Answer `COUNT(*)` statements with `count`
    pub fn with_count(self, count: i64) -> Self {
        self.with_query_response("COUNT(*)", count_result(count))
    }

    pub fn query_log(&self) -> Vec<String> {
        self.query_log.lock().clone()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn respond(&self, sql: &str) -> Result<QueryResult> {
        self.query_log.lock().push(sql.to_string());
        if self.failing_patterns.iter().any(|p| sql.contains(p.as_str())) {
            return Err(TabconvError::Query(format!("mock failure for: {}", sql)));
        }
        self.query_responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .ok_or_else(|| TabconvError::Query(format!("no response for: {}", sql)))
    }

    fn table(&self, name: &str) -> Result<&MockTable> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| TabconvError::Schema(format!("no such table: {}", name)))
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        &self.driver
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.respond(sql)
    }

    async fn open_cursor(&self, sql: &str) -> Result<Box<dyn RowCursor>> {
        Ok(Box::new(ResultSetCursor::new(self.respond(sql)?)))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        if self.introspection { Some(self) } else { None }
    }
}

#[async_trait]
impl SchemaIntrospection for MockConnection {
    async fn list_tables(&self, _schema: Option<&str>) -> Result<Vec<TableInfo>> {
        Ok(self.tables.iter().map(|t| TableInfo::new(&t.name)).collect())
    }

    async fn get_columns(&self, _schema: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn get_primary_key(
        &self,
        _schema: Option<&str>,
        table: &str,
    ) -> Result<Option<PrimaryKeyInfo>> {
        Ok(self.table(table)?.primary_key.clone())
    }

    async fn get_foreign_keys(
        &self,
        _schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ForeignKeyInfo>> {
        Ok(self.table(table)?.foreign_keys.clone())
    }
}

/// Result set with `(name, type)` columns
pub fn result(columns: &[(&str, &str)], rows: Vec<Vec<Value>>) -> QueryResult {
    let columns = columns
        .iter()
        .enumerate()
        .map(|(i, (n, t))| ColumnMeta::new(*n, *t, i))
        .collect();
    QueryResult::from_rows(columns, rows)
}

pub fn count_result(count: i64) -> QueryResult {
    result(&[("count", "BIGINT")], vec![vec![Value::Int64(count)]])
}

/// In-memory writer that stays readable after being handed to a job
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Initialize logging for tests if not already initialized
pub fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("tabconv_interchange=debug".parse().unwrap()),
            )
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
