//! Operator reference tables
//!
//! The reference data ships as MySQL dumps whose table and column names the
//! schema keeps. They are small next to the portability export, so each dump
//! is normalised to PostgreSQL and executed as a whole inside one transaction
//! through the simple query protocol.

use serde::Serialize;
use sqlx::PgPool;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::decoder::DESTINATION_TABLE;
use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTable {
    OperatorRanges,
    OperatorsRn1,
    OperatorsStfc,
}

impl ReferenceTable {
    pub const ALL: [ReferenceTable; 3] = [
        ReferenceTable::OperatorRanges,
        ReferenceTable::OperatorsRn1,
        ReferenceTable::OperatorsStfc,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            ReferenceTable::OperatorRanges => "faixa_operadora",
            ReferenceTable::OperatorsRn1 => "operadoras_rn1",
            ReferenceTable::OperatorsStfc => "operadoras_stfc",
        }
    }

    /// Table a published dump file populates, by file name.
    pub fn for_dump(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        match stem {
            "faixa_operadora" => Some(ReferenceTable::OperatorRanges),
            "operadoras_rn1" => Some(ReferenceTable::OperatorsRn1),
            "operadoras_stfc" => Some(ReferenceTable::OperatorsStfc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceLoad {
    pub table: Option<ReferenceTable>,
    pub truncated: bool,
    pub rows_before: Option<u64>,
    pub rows_after: Option<u64>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: u64,
}

/// Execute a reference dump. With `truncate`, the dump's target table
/// (derived from its file name) is emptied first in the same transaction.
pub async fn load_sql_file(pool: &PgPool, path: &Path, truncate: bool) -> Result<ReferenceLoad> {
    if !path.exists() {
        return Err(IngestError::SourceNotFound(path.to_path_buf()));
    }

    let table = ReferenceTable::for_dump(path);
    if truncate && table.is_none() {
        return Err(IngestError::config(format!(
            "cannot tell which table {} loads, refusing to truncate",
            path.display()
        )));
    }

    let raw = tokio::fs::read(path).await?;
    let sql = String::from_utf8(raw)
        .map_err(|e| IngestError::Encoding(format!("{}: {}", path.display(), e)))?;
    let sql = normalize_dump(&sql);

    let start = Instant::now();
    let rows_before = match table {
        Some(t) => Some(count_rows(pool, t.table_name()).await?),
        None => None,
    };

    let mut tx = pool.begin().await?;
    if let (true, Some(t)) = (truncate, table) {
        sqlx::raw_sql(&format!("TRUNCATE {} RESTART IDENTITY", t.table_name()))
            .execute(&mut *tx)
            .await?;
    }
    sqlx::raw_sql(&sql).execute(&mut *tx).await?;
    tx.commit().await?;

    let rows_after = match table {
        Some(t) => Some(count_rows(pool, t.table_name()).await?),
        None => None,
    };

    let load = ReferenceLoad {
        table,
        truncated: truncate,
        rows_before,
        rows_after,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        file = %path.display(),
        table = ?load.table,
        rows_before = ?load.rows_before,
        rows_after = ?load.rows_after,
        duration_ms = load.duration_ms,
        "Reference dump loaded"
    );
    Ok(load)
}

/// MySQL-only lines dropped from a dump before execution.
const MYSQL_ONLY_PREFIXES: [&str; 9] = [
    "SET SQL_MODE",
    "SET time_zone",
    "SET @",
    "SET NAMES",
    "START TRANSACTION",
    "COMMIT",
    "/*!",
    "LOCK TABLES",
    "UNLOCK TABLES",
];

/// Rewrite a phpMyAdmin/mysqldump export into statements PostgreSQL accepts.
///
/// `CREATE TABLE` and `ALTER TABLE` statements are dropped because the
/// migrations own the schema; only the data statements survive.
pub fn normalize_dump(sql: &str) -> String {
    let sql = sql
        .replace('`', "")
        .replace('\r', "")
        .replace(" ENGINE=InnoDB", "")
        .replace(" DEFAULT CHARSET=utf8mb4", "")
        .replace(" COLLATE=utf8mb4_0900_ai_ci", "")
        .replace(" COLLATE utf8mb4_0900_ai_ci", "");

    let mut out = String::with_capacity(sql.len());
    let mut in_schema_statement = false;

    for line in sql.lines() {
        let trimmed = line.trim();

        if in_schema_statement {
            if trimmed.ends_with(';') {
                in_schema_statement = false;
            }
            continue;
        }
        if trimmed.starts_with("CREATE TABLE") || trimmed.starts_with("ALTER TABLE") {
            in_schema_statement = !trimmed.ends_with(';');
            continue;
        }
        if MYSQL_ONLY_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            continue;
        }

        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Row counts for the reference tables and the portability history.
pub async fn reference_counts(pool: &PgPool) -> Result<Vec<TableCount>> {
    let mut counts = Vec::with_capacity(4);
    let tables = ReferenceTable::ALL
        .iter()
        .map(ReferenceTable::table_name)
        .chain(std::iter::once(DESTINATION_TABLE));

    for table in tables {
        counts.push(TableCount {
            table: table.to_string(),
            rows: count_rows(pool, table).await?,
        });
    }
    Ok(counts)
}

/// Number of operator ranges whose start lies after their end.
pub async fn validate_ranges(pool: &PgPool) -> Result<u64> {
    let invalid: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM faixa_operadora WHERE faixa_inicio > faixa_fim")
            .fetch_one(pool)
            .await?;

    if invalid > 0 {
        warn!(invalid, "Operator ranges whose start lies after their end");
    }
    Ok(invalid.max(0) as u64)
}

async fn count_rows(pool: &PgPool, table: &str) -> Result<u64> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(count.max(0) as u64)
}
