//! Generic parameterised SQL passthrough.
//!
//! Executes exactly one statement per request inside a transaction that
//! carries the caller's agency in `app.current_agency`, a local
//! `statement_timeout`, and the [`QUERY_ROLE`] role. The row-level security
//! policies of migration `003_row_level_security` restrict that role to rows
//! of the current agency. Statements that would change the session or end the
//! transaction are refused before they reach the database.
//!
//! Parameters are bound with their JSON type (null and strings as `TEXT`,
//! integers as `INT8`, floats as `FLOAT8`, booleans as `BOOL`, arrays and
//! objects as `JSONB`). Columns of other types need an explicit cast in the
//! SQL text, e.g. `WHERE id = $1::uuid`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo};
use thiserror::Error;
use tokio_stream::StreamExt;
use tracing::{debug, instrument};

use agencyhub_core::AgencyId;

/// Database role every passthrough statement runs as.
pub const QUERY_ROLE: &str = "agencyhub_query";

/// Leading keywords that alter session or transaction state.
const SESSION_KEYWORDS: [&str; 13] = [
    "set", "reset", "do", "begin", "start", "commit", "end", "rollback", "abort", "savepoint",
    "release", "discard", "prepare",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub rows: Vec<Map<String, JsonValue>>,
    pub row_count: usize,
    /// More rows were available than the configured limit.
    pub truncated: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("sql must not be empty")]
    EmptySql,

    #[error("only a single statement is allowed per request")]
    MultipleStatements,

    #[error("unterminated quote or comment in sql")]
    Unterminated,

    #[error("statements that change session or transaction state are not allowed")]
    SessionControl,

    #[error("statement timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(String),
}

/// A JSON parameter mapped onto a Postgres bind type.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(JsonValue),
}

impl SqlParam {
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => SqlParam::Null,
            JsonValue::Bool(b) => SqlParam::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Int(i),
                None => SqlParam::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => SqlParam::Text(s.clone()),
            JsonValue::Array(_) | JsonValue::Object(_) => SqlParam::Json(value.clone()),
        }
    }

    fn bind(self, query: Query<'_, Postgres, PgArguments>) -> Query<'_, Postgres, PgArguments> {
        match self {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(b) => query.bind(b),
            SqlParam::Int(i) => query.bind(i),
            SqlParam::Float(f) => query.bind(f),
            SqlParam::Text(s) => query.bind(s),
            SqlParam::Json(v) => query.bind(sqlx::types::Json(v)),
        }
    }
}

/// Validate that `sql` holds exactly one statement.
///
/// Returns the statement without its trailing semicolon. Semicolons inside
/// string literals, quoted identifiers, dollar-quoted bodies and comments do
/// not count.
pub fn single_statement(sql: &str) -> Result<&str, QueryError> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    let mut end: Option<usize> = None;

    while i < bytes.len() {
        let c = bytes[i];
        if end.is_some() {
            // After the first `;` only whitespace, comments and further `;` may follow.
            match c {
                b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line_comment(bytes, i),
                b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i)?,
                b';' => i += 1,
                c if c.is_ascii_whitespace() => i += 1,
                _ => return Err(QueryError::MultipleStatements),
            }
            continue;
        }

        match c {
            b'\'' | b'"' => i = skip_quoted(bytes, i, c)?,
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i)?,
            b'$' => i = skip_dollar_quoted(bytes, i)?,
            b';' => {
                end = Some(i);
                i += 1;
            }
            _ => i += 1,
        }
    }

    let statement = match end {
        Some(stmt_end) => &sql[..stmt_end],
        None => sql,
    }
    .trim();

    if statement.is_empty() {
        return Err(QueryError::EmptySql);
    }
    Ok(statement)
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> Result<usize, QueryError> {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            // Doubled quote is an escaped quote.
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(QueryError::Unterminated)
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| start + p + 1)
        .unwrap_or(bytes.len())
}

fn skip_block_comment(bytes: &[u8], start: usize) -> Result<usize, QueryError> {
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return Ok(i + 2);
        }
        i += 1;
    }
    Err(QueryError::Unterminated)
}

/// `$tag$ ... $tag$` bodies. A `$` followed by a digit is a parameter.
fn skip_dollar_quoted(bytes: &[u8], start: usize) -> Result<usize, QueryError> {
    let tag_len = bytes[start + 1..]
        .iter()
        .position(|&b| !(b.is_ascii_alphanumeric() || b == b'_'));
    let Some(tag_len) = tag_len else {
        return Ok(bytes.len());
    };
    let close = start + 1 + tag_len;
    let is_tag = bytes[close] == b'$'
        && bytes
            .get(start + 1)
            .is_none_or(|b| !b.is_ascii_digit());
    if !is_tag {
        return Ok(start + 1);
    }

    let tag = &bytes[start..=close];
    let body = close + 1;
    bytes[body..]
        .windows(tag.len())
        .position(|w| w == tag)
        .map(|p| body + p + tag.len())
        .ok_or(QueryError::Unterminated)
}

/// The statement's SQL with literals, comments and dollar-quoted bodies
/// blanked out and quoted identifiers unwrapped, lowercased.
fn code_text(statement: &str) -> Result<String, QueryError> {
    let bytes = statement.as_bytes();
    let mut code = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let next = match bytes[i] {
            b'\'' => skip_quoted(bytes, i, b'\'')?,
            b'"' => {
                let end = skip_quoted(bytes, i, b'"')?;
                code.extend_from_slice(&bytes[i + 1..end - 1]);
                i = end;
                continue;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => skip_block_comment(bytes, i)?,
            b'$' => skip_dollar_quoted(bytes, i)?,
            c => {
                code.push(c);
                i += 1;
                continue;
            }
        };
        if next == i + 1 {
            code.push(bytes[i]);
        } else {
            code.push(b' ');
        }
        i = next;
    }
    Ok(String::from_utf8_lossy(&code).to_ascii_lowercase())
}

/// Refuse statements that could leave the passthrough role or agency.
pub fn ensure_data_statement(statement: &str) -> Result<(), QueryError> {
    let code = code_text(statement)?;
    let leading = code
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .find(|word| !word.is_empty())
        .unwrap_or_default();
    if SESSION_KEYWORDS.contains(&leading) || code.contains("set_config") {
        return Err(QueryError::SessionControl);
    }
    Ok(())
}

/// Executes single statements against Postgres on behalf of an agency.
#[derive(Debug, Clone)]
pub struct SqlProxy {
    pool: Arc<PgPool>,
    row_limit: usize,
    statement_timeout_ms: u64,
}

impl SqlProxy {
    pub fn new(pool: Arc<PgPool>, row_limit: usize, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            row_limit: row_limit.max(1),
            statement_timeout_ms,
        }
    }

    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    #[instrument(
        skip(self, request),
        fields(agency_id = %agency_id, param_count = request.params.len()),
        err
    )]
    pub async fn execute(
        &self,
        agency_id: AgencyId,
        request: &QueryRequest,
    ) -> Result<QueryResponse, QueryError> {
        let statement = single_statement(&request.sql)?;
        ensure_data_statement(statement)?;

        let mut tx = self.pool.begin().await.map_err(map_query_error)?;

        sqlx::query("SELECT set_config('app.current_agency', $1, true)")
            .bind(agency_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_query_error)?;
        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(self.statement_timeout_ms.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_query_error)?;
        sqlx::query(&format!("SET LOCAL ROLE {QUERY_ROLE}"))
            .execute(&mut *tx)
            .await
            .map_err(map_query_error)?;

        let query = request
            .params
            .iter()
            .map(SqlParam::from_json)
            .fold(sqlx::query(statement), |q, param| param.bind(q));

        let mut rows = Vec::new();
        let mut truncated = false;
        {
            let mut stream = query.fetch(&mut *tx);
            while let Some(row) = stream.next().await {
                let row = row.map_err(map_query_error)?;
                if rows.len() == self.row_limit {
                    truncated = true;
                    break;
                }
                rows.push(row_to_json(&row));
            }
        }

        tx.commit().await.map_err(map_query_error)?;

        debug!(row_count = rows.len(), truncated, "query executed");
        Ok(QueryResponse {
            row_count: rows.len(),
            rows,
            truncated,
        })
    }
}

fn map_query_error(err: sqlx::Error) -> QueryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("57014") => {
            QueryError::Timeout
        }
        sqlx::Error::Database(db_err) => QueryError::Database(db_err.message().to_string()),
        _ => QueryError::Database(err.to_string()),
    }
}

fn row_to_json(row: &PgRow) -> Map<String, JsonValue> {
    row.columns()
        .iter()
        .map(|col| {
            let value = column_to_json(row, col.ordinal(), col.type_info().name());
            (col.name().to_string(), value)
        })
        .collect()
}

fn column_to_json(row: &PgRow, idx: usize, type_name: &str) -> JsonValue {
    fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
    where
        T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        row.try_get::<Option<T>, _>(idx).ok().flatten()
    }

    let value = match type_name {
        "BOOL" => get::<bool>(row, idx).map(JsonValue::from),
        "INT2" => get::<i16>(row, idx).map(JsonValue::from),
        "INT4" => get::<i32>(row, idx).map(JsonValue::from),
        "INT8" => get::<i64>(row, idx).map(JsonValue::from),
        "FLOAT4" => get::<f32>(row, idx).map(JsonValue::from),
        "FLOAT8" => get::<f64>(row, idx).map(JsonValue::from),
        "NUMERIC" => get::<Decimal>(row, idx).map(|d| JsonValue::String(d.to_string())),
        "UUID" => get::<uuid::Uuid>(row, idx).map(|u| JsonValue::String(u.to_string())),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, idx).map(|t| JsonValue::String(t.to_rfc3339())),
        "TIMESTAMP" => get::<NaiveDateTime>(row, idx)
            .map(|t| JsonValue::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => get::<NaiveDate>(row, idx).map(|d| JsonValue::String(d.to_string())),
        "TIME" => get::<NaiveTime>(row, idx).map(|t| JsonValue::String(t.to_string())),
        "JSON" | "JSONB" => get::<JsonValue>(row, idx),
        _ => get::<String>(row, idx).map(JsonValue::String),
    };
    value.unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_one_statement_with_trailing_semicolon() {
        assert_eq!(
            single_statement("  SELECT * FROM leads WHERE id = $1;  ").unwrap(),
            "SELECT * FROM leads WHERE id = $1"
        );
        assert_eq!(single_statement("SELECT 1;; -- done\n").unwrap(), "SELECT 1");
    }

    #[test]
    fn rejects_empty_and_multiple_statements() {
        assert_eq!(single_statement("   "), Err(QueryError::EmptySql));
        assert_eq!(single_statement(";"), Err(QueryError::EmptySql));
        assert_eq!(
            single_statement("SELECT 1; DROP TABLE records"),
            Err(QueryError::MultipleStatements)
        );
    }

    #[test]
    fn semicolons_inside_literals_and_comments_do_not_split() {
        let sql = "SELECT 'a;b', \"weird;col\" /* ; */ FROM t -- ;\nWHERE x = 'it''s;'";
        assert_eq!(single_statement(sql).unwrap(), sql);

        let body = "SELECT $fn$ select 1; select 2; $fn$ AS body";
        assert_eq!(single_statement(body).unwrap(), body);
    }

    #[test]
    fn positional_parameters_are_not_dollar_quotes() {
        let sql = "UPDATE t SET a = $1 WHERE b = $2";
        assert_eq!(single_statement(sql).unwrap(), sql);
    }

    #[test]
    fn unterminated_literals_are_rejected() {
        assert_eq!(single_statement("SELECT 'oops"), Err(QueryError::Unterminated));
        assert_eq!(single_statement("SELECT 1 /* x"), Err(QueryError::Unterminated));
    }

    #[test]
    fn session_and_transaction_control_is_refused() {
        for sql in [
            "RESET ROLE",
            "  set role postgres",
            "/* hi */ SET app.current_agency = 'x'",
            "COMMIT",
            "DO $$ BEGIN RESET ROLE; END $$",
            "SELECT pg_catalog.set_config('role', 'postgres', true)",
            "SELECT \"SET_CONFIG\"('app.current_agency', $1, true)",
        ] {
            assert_eq!(ensure_data_statement(sql), Err(QueryError::SessionControl), "{sql}");
        }
    }

    #[test]
    fn data_statements_mentioning_keywords_in_text_are_allowed() {
        for sql in [
            "SELECT * FROM records WHERE collection = $1",
            "SELECT 'set_config' AS name -- reset role\n",
            "UPDATE records SET body = $1::jsonb WHERE record_id = $2::uuid",
            "WITH x AS (SELECT 1) SELECT * FROM x",
        ] {
            assert_eq!(ensure_data_statement(sql), Ok(()), "{sql}");
        }
    }

    #[test]
    fn json_params_map_to_bind_types() {
        assert_eq!(SqlParam::from_json(&json!(null)), SqlParam::Null);
        assert_eq!(SqlParam::from_json(&json!(true)), SqlParam::Bool(true));
        assert_eq!(SqlParam::from_json(&json!(42)), SqlParam::Int(42));
        assert_eq!(SqlParam::from_json(&json!(1.5)), SqlParam::Float(1.5));
        assert_eq!(
            SqlParam::from_json(&json!("x")),
            SqlParam::Text("x".to_string())
        );
        assert_eq!(
            SqlParam::from_json(&json!({"a": [1]})),
            SqlParam::Json(json!({"a": [1]}))
        );
    }

    #[test]
    fn request_params_default_to_empty() {
        let req: QueryRequest = serde_json::from_value(json!({"sql": "SELECT 1"})).unwrap();
        assert!(req.params.is_empty());
    }
}
