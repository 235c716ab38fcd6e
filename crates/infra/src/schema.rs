//! Database schema bootstrap.

use sqlx::PgPool;
use tracing::info;

use crate::store::StoreError;

const MIGRATIONS: [(&str, &str); 3] = [
    ("001_records", include_str!("../migrations/001_records.sql")),
    ("002_activity_log", include_str!("../migrations/002_activity_log.sql")),
    ("003_row_level_security", include_str!("../migrations/003_row_level_security.sql")),
];

/// Apply pending migrations, recording each in `schema_migrations`.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::Backend(format!("create schema_migrations: {e}")))?;

    for (name, sql) in MIGRATIONS {
        let applied: Option<(String,)> =
            sqlx::query_as("SELECT name FROM schema_migrations WHERE name = $1")
                .bind(name)
                .fetch_optional(pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        if applied.is_some() {
            continue;
        }

        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration {name} failed: {e}")))?;
        sqlx::query("INSERT INTO schema_migrations (name) VALUES ($1)")
            .bind(name)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        info!(migration = name, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_proxy::QUERY_ROLE;

    #[test]
    fn migrations_apply_in_name_order() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn passthrough_role_is_confined_to_its_agency() {
        let (_, sql) = MIGRATIONS[2];
        assert!(sql.contains(&format!("CREATE ROLE {QUERY_ROLE} NOLOGIN")));
        for table in ["records", "activity_log"] {
            assert!(sql.contains(&format!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY")));
            assert!(sql.contains(&format!("ON {table}\n    TO {QUERY_ROLE}")));
        }
        assert_eq!(sql.matches("current_setting('app.current_agency', true)").count(), 4);
    }
}
