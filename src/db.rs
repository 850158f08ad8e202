//! SQL plumbing shared by the query source and the database sinks.
//!
//! SQLite goes through `rusqlite`, PostgreSQL through the sync `postgres`
//! client and MySQL through the sync `mysql` client. Tables are always
//! replaced wholesale.

use std::fs;
use std::path::PathBuf;

use mysql::prelude::Queryable;
use mysql::{Opts, OptsBuilder, Params, TxOpts};
use postgres::types::{ToSql as PgToSql, Type};
use postgres::NoTls;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use tracing::debug;

use crate::config::ManagedDbConfig;
use crate::dataset::{ColumnType, Dataset, Value};
use crate::error::{EtlError, Result};

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Sqlite(SqliteTarget),
    Postgres(String),
    /// Normalized to the `mysql://` scheme.
    MySql(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    Memory,
    File(PathBuf),
}

impl Connection {
    /// Accepts `sqlite:///relative.db`, `sqlite:////abs/path.db`,
    /// `sqlite://` / `sqlite::memory:` for an in-memory database,
    /// `postgres://` / `postgresql://` URLs, and `mysql://` /
    /// `mysql+pymysql://` URLs.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == "sqlite://" || raw == "sqlite::memory:" || raw == "sqlite:///:memory:" {
            return Ok(Connection::Sqlite(SqliteTarget::Memory));
        }
        if let Some(path) = raw.strip_prefix("sqlite:///") {
            if path.is_empty() {
                return Err(EtlError::Configuration(format!(
                    "connection string '{raw}' has no database path"
                )));
            }
            return Ok(Connection::Sqlite(SqliteTarget::File(PathBuf::from(path))));
        }
        if raw.starts_with("postgres://") || raw.starts_with("postgresql://") {
            return Ok(Connection::Postgres(raw.to_string()));
        }
        if let Some(rest) = raw
            .strip_prefix("mysql://")
            .or_else(|| raw.strip_prefix("mysql+pymysql://"))
        {
            return Ok(Connection::MySql(format!("mysql://{rest}")));
        }
        Err(EtlError::Configuration(format!(
            "unsupported connection string '{}'; expected sqlite:///, postgres:// or mysql://",
            redact(raw)
        )))
    }

    /// Connection string safe to log.
    pub fn describe(&self) -> String {
        match self {
            Connection::Sqlite(SqliteTarget::Memory) => "sqlite::memory:".to_string(),
            Connection::Sqlite(SqliteTarget::File(path)) => format!("sqlite:///{}", path.display()),
            Connection::Postgres(url) | Connection::MySql(url) => redact(url),
        }
    }
}

/// Hides the password component of a URL-style connection string.
fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((userinfo, host)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:***@{host}")
        }
        None => url.to_string(),
    }
}

/// The SQL flavour a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    pub fn quote(self, name: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
            Dialect::Sqlite | Dialect::Postgres => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    pub fn column_type(self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (Dialect::Sqlite, ColumnType::Integer | ColumnType::Boolean) => "INTEGER",
            (Dialect::Sqlite, ColumnType::Float) => "REAL",
            (_, ColumnType::Integer) => "BIGINT",
            (Dialect::Postgres, ColumnType::Float) => "DOUBLE PRECISION",
            (_, ColumnType::Float) => "DOUBLE",
            (_, ColumnType::Boolean) => "BOOLEAN",
            (_, ColumnType::Text) => "TEXT",
        }
    }

    /// Positional placeholder for the 1-based parameter `index`.
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Postgres => format!("${index}"),
            Dialect::MySql => "?".to_string(),
        }
    }

    pub fn drop_table_sql(self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table))
    }

    pub fn create_table_sql(self, table: &str, dataset: &Dataset) -> String {
        let columns: Vec<String> = dataset
            .columns()
            .iter()
            .zip(dataset.column_types())
            .map(|(name, ty)| format!("{} {}", self.quote(name), self.column_type(*ty)))
            .collect();
        format!("CREATE TABLE {} ({})", self.quote(table), columns.join(", "))
    }

    pub fn insert_sql(self, table: &str, dataset: &Dataset) -> String {
        let columns: Vec<String> = dataset.columns().iter().map(|c| self.quote(c)).collect();
        let params: Vec<String> = (1..=dataset.width()).map(|i| self.placeholder(i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table),
            columns.join(", "),
            params.join(", ")
        )
    }
}

// ---------------------------------------------------------------- SQLite

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Missing => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

pub fn open_sqlite(target: &SqliteTarget) -> Result<rusqlite::Connection> {
    match target {
        SqliteTarget::Memory => Ok(rusqlite::Connection::open_in_memory()?),
        SqliteTarget::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            Ok(rusqlite::Connection::open(path)?)
        }
    }
}

/// Drops and recreates `table`, then inserts every row. Returns rows written.
pub fn replace_sqlite_table(
    conn: &mut rusqlite::Connection,
    table: &str,
    dataset: &Dataset,
) -> Result<usize> {
    let tx = conn.transaction()?;
    tx.execute(&Dialect::Sqlite.drop_table_sql(table), [])?;
    tx.execute(&Dialect::Sqlite.create_table_sql(table, dataset), [])?;
    {
        let mut stmt = tx.prepare(&Dialect::Sqlite.insert_sql(table, dataset))?;
        for row in dataset.rows() {
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
        }
    }
    tx.commit()?;
    debug!(table, rows = dataset.len(), "replaced sqlite table");
    Ok(dataset.len())
}

pub fn query_sqlite(conn: &rusqlite::Connection, query: &str) -> Result<Dataset> {
    let mut stmt = conn.prepare(query)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut result = stmt.query([])?;
    while let Some(row) = result.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(match row.get_ref(idx)? {
                ValueRef::Null => Value::Missing,
                ValueRef::Integer(i) => Value::Integer(i),
                ValueRef::Real(f) => Value::from_f64(f),
                ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(b) => Value::Text(hex::encode(b)),
            });
        }
        rows.push(values);
    }

    Dataset::infer(columns, rows)
}

// ------------------------------------------------------------ PostgreSQL

pub fn connect_postgres(url: &str) -> Result<postgres::Client> {
    Ok(postgres::Client::connect(url, NoTls)?)
}

fn pg_param_type(ty: ColumnType) -> Type {
    match ty {
        ColumnType::Integer => Type::INT8,
        ColumnType::Float => Type::FLOAT8,
        ColumnType::Boolean => Type::BOOL,
        ColumnType::Text => Type::TEXT,
    }
}

/// Typed parameter for a cell of a column declared as `ty`.
fn pg_param(value: &Value, ty: ColumnType) -> Box<dyn PgToSql + Sync> {
    match ty {
        ColumnType::Integer => Box::new(match value.cast(ColumnType::Integer) {
            Some(Value::Integer(i)) => Some(i),
            _ => None,
        }),
        ColumnType::Float => Box::new(value.as_f64()),
        ColumnType::Boolean => Box::new(match value.cast(ColumnType::Boolean) {
            Some(Value::Boolean(b)) => Some(b),
            _ => None,
        }),
        ColumnType::Text => Box::new(if value.is_missing() {
            None
        } else {
            Some(value.render())
        }),
    }
}

pub fn replace_postgres_table(
    client: &mut postgres::Client,
    table: &str,
    dataset: &Dataset,
) -> Result<usize> {
    let mut tx = client.transaction()?;
    tx.batch_execute(&Dialect::Postgres.drop_table_sql(table))?;
    tx.batch_execute(&Dialect::Postgres.create_table_sql(table, dataset))?;

    let types: Vec<Type> = dataset.column_types().iter().map(|t| pg_param_type(*t)).collect();
    let stmt = tx.prepare_typed(&Dialect::Postgres.insert_sql(table, dataset), &types)?;
    for row in dataset.rows() {
        let params: Vec<Box<dyn PgToSql + Sync>> = row
            .iter()
            .zip(dataset.column_types())
            .map(|(value, ty)| pg_param(value, *ty))
            .collect();
        let refs: Vec<&(dyn PgToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
        tx.execute(&stmt, &refs)?;
    }
    tx.commit()?;
    debug!(table, rows = dataset.len(), "replaced postgres table");
    Ok(dataset.len())
}

pub fn query_postgres(client: &mut postgres::Client, query: &str) -> Result<Dataset> {
    let rows = client.query(query, &[])?;
    let Some(first) = rows.first() else {
        // No rows: still recover the column names from the statement
        let stmt = client.prepare(query)?;
        let columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        return Dataset::infer(columns, Vec::new());
    };

    let columns: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();
    let mut data = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, column) in row.columns().iter().enumerate() {
            let ty = column.type_();
            let value = if *ty == Type::INT2 {
                row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Integer(v.into()))
            } else if *ty == Type::INT4 {
                row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Integer(v.into()))
            } else if *ty == Type::INT8 {
                row.try_get::<_, Option<i64>>(idx)?.map(Value::Integer)
            } else if *ty == Type::FLOAT4 {
                row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::from_f64(v.into()))
            } else if *ty == Type::FLOAT8 {
                row.try_get::<_, Option<f64>>(idx)?.map(Value::from_f64)
            } else if *ty == Type::BOOL {
                row.try_get::<_, Option<bool>>(idx)?.map(Value::Boolean)
            } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
                row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
            } else {
                return Err(EtlError::Extraction(format!(
                    "column '{}' has unsupported type {}; cast it to text in the query",
                    column.name(),
                    ty
                )));
            };
            values.push(value.unwrap_or(Value::Missing));
        }
        data.push(values);
    }

    Dataset::infer(columns, data)
}

// ----------------------------------------------------------------- MySQL

/// The statements the MySQL loaders issue.
pub trait MySqlSession {
    /// Runs one statement and returns the affected row count.
    fn execute(&mut self, sql: &str) -> Result<u64>;
    /// Runs `sql` once per row, all inside one transaction.
    fn insert_rows(&mut self, sql: &str, rows: Vec<Vec<mysql::Value>>) -> Result<()>;
}

/// Opens sessions against one MySQL server.
pub trait MySqlConnector {
    /// Connects with `database` as the default schema, or the one named in
    /// the server's connection options when `None`.
    fn connect(&self, database: Option<&str>) -> Result<Box<dyn MySqlSession>>;
}

/// A MySQL server reached over TCP.
pub struct MySqlServer {
    opts: Opts,
}

impl MySqlServer {
    pub fn from_url(url: &str) -> Result<Self> {
        let opts = Opts::from_url(url).map_err(|e| {
            EtlError::Configuration(format!(
                "invalid MySQL connection string '{}': {e}",
                redact(url)
            ))
        })?;
        Ok(Self { opts })
    }

    pub fn managed(config: &ManagedDbConfig) -> Self {
        let builder = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.clone()))
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()));
        Self {
            opts: Opts::from(builder),
        }
    }

    pub fn open(&self, database: Option<&str>) -> Result<mysql::Conn> {
        let mut builder = OptsBuilder::from_opts(self.opts.clone());
        if let Some(database) = database {
            builder = builder.db_name(Some(database));
        }
        Ok(mysql::Conn::new(Opts::from(builder))?)
    }
}

struct LiveSession(mysql::Conn);

impl MySqlSession for LiveSession {
    fn execute(&mut self, sql: &str) -> Result<u64> {
        let result = self.0.query_iter(sql)?;
        Ok(result.affected_rows())
    }

    fn insert_rows(&mut self, sql: &str, rows: Vec<Vec<mysql::Value>>) -> Result<()> {
        let mut tx = self.0.start_transaction(TxOpts::default())?;
        tx.exec_batch(sql, rows.into_iter().map(Params::Positional))?;
        tx.commit()?;
        Ok(())
    }
}

impl MySqlConnector for MySqlServer {
    fn connect(&self, database: Option<&str>) -> Result<Box<dyn MySqlSession>> {
        Ok(Box::new(LiveSession(self.open(database)?)))
    }
}

fn mysql_value(value: &Value) -> mysql::Value {
    match value {
        Value::Missing => mysql::Value::NULL,
        Value::Integer(i) => mysql::Value::Int(*i),
        Value::Float(f) => mysql::Value::Double(*f),
        Value::Boolean(b) => mysql::Value::Int(i64::from(*b)),
        Value::Text(s) => mysql::Value::Bytes(s.as_bytes().to_vec()),
    }
}

/// Creates `database` unless it already exists. Returns true when created.
pub fn ensure_mysql_database(session: &mut dyn MySqlSession, database: &str) -> Result<bool> {
    let affected = session.execute(&format!(
        "CREATE DATABASE IF NOT EXISTS {}",
        Dialect::MySql.quote(database)
    ))?;
    Ok(affected > 0)
}

/// Drops and recreates `table`, then inserts every row in one transaction.
pub fn replace_mysql_table(
    session: &mut dyn MySqlSession,
    table: &str,
    dataset: &Dataset,
) -> Result<usize> {
    // DDL commits implicitly in MySQL, so only the inserts share a transaction
    session.execute(&Dialect::MySql.drop_table_sql(table))?;
    session.execute(&Dialect::MySql.create_table_sql(table, dataset))?;
    let rows = dataset
        .rows()
        .iter()
        .map(|row| row.iter().map(mysql_value).collect())
        .collect();
    session.insert_rows(&Dialect::MySql.insert_sql(table, dataset), rows)?;
    debug!(table, rows = dataset.len(), "replaced mysql table");
    Ok(dataset.len())
}

/// Creates the managed database through the maintenance database when
/// absent, then replaces `table` inside it. Returns whether the database was
/// created and how many rows were written.
pub fn load_managed(
    connector: &dyn MySqlConnector,
    config: &ManagedDbConfig,
    table: &str,
    dataset: &Dataset,
) -> Result<(bool, usize)> {
    let created = {
        let mut admin = connector.connect(Some(config.maintenance_database.as_str()))?;
        ensure_mysql_database(admin.as_mut(), &config.database)?
    };
    let mut session = connector.connect(Some(config.database.as_str()))?;
    let rows = replace_mysql_table(session.as_mut(), table, dataset)?;
    Ok((created, rows))
}

fn from_mysql(value: Option<&mysql::Value>) -> Value {
    match value {
        None | Some(mysql::Value::NULL) => Value::Missing,
        Some(mysql::Value::Bytes(b)) => Value::Text(String::from_utf8_lossy(b).into_owned()),
        Some(mysql::Value::Int(i)) => Value::Integer(*i),
        Some(mysql::Value::UInt(u)) => match i64::try_from(*u) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::from_f64(*u as f64),
        },
        Some(mysql::Value::Float(f)) => Value::from_f64(f64::from(*f)),
        Some(mysql::Value::Double(d)) => Value::from_f64(*d),
        Some(mysql::Value::Date(y, mo, d, 0, 0, 0, 0)) => {
            Value::Text(format!("{y:04}-{mo:02}-{d:02}"))
        }
        Some(mysql::Value::Date(y, mo, d, h, mi, s, _)) => {
            Value::Text(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
        }
        Some(mysql::Value::Time(negative, days, h, mi, s, _)) => {
            let hours = days * 24 + u32::from(*h);
            let sign = if *negative { "-" } else { "" };
            Value::Text(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
        }
    }
}

pub fn query_mysql(conn: &mut mysql::Conn, query: &str) -> Result<Dataset> {
    let mut result = conn.query_iter(query)?;
    let columns: Vec<String> = result
        .columns()
        .as_ref()
        .iter()
        .map(|c| c.name_str().into_owned())
        .collect();

    let mut rows = Vec::new();
    for row in result.by_ref() {
        let row = row?;
        rows.push((0..columns.len()).map(|idx| from_mysql(row.as_ref(idx))).collect());
    }

    Dataset::infer(columns, rows)
}
