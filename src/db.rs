use anyhow::{Context, Result};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
    TransactionTrait,
};
use std::{path::PathBuf, time::Duration};
use tokio::fs;

/// Create a SeaORM connection.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let mut opts = ConnectOptions::new(database_url.to_owned());
    opts.connect_timeout(Duration::from_secs(5))
        .acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false);
    let conn = Database::connect(opts).await?;
    Ok(conn)
}

/// Executes SQL files in `migrations/` in filename order, skipping files
/// already recorded in `schema_migrations`.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let backend = conn.get_database_backend();
    conn.execute(Statement::from_string(
        backend,
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );",
    ))
    .await?;

    let mut entries = fs::read_dir("migrations")
        .await
        .context("migrations directory not found")?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();

    for file in files {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .context("migration file name is not utf-8")?
            .to_string();

        let applied = conn
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT name FROM schema_migrations WHERE name = $1",
                [name.clone().into()],
            ))
            .await?;
        if applied.is_some() {
            continue;
        }

        let sql = fs::read_to_string(&file).await?;
        let txn = conn.begin().await?;
        // Postgres prepared statements cannot contain multiple commands,
        // so split the migration file and run each statement individually.
        for stmt in sql.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            txn.execute(Statement::from_string(backend, format!("{stmt};")))
                .await
                .with_context(|| format!("migration {name} failed"))?;
        }
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "INSERT INTO schema_migrations (name) VALUES ($1)",
            [name.clone().into()],
        ))
        .await?;
        txn.commit().await?;
        tracing::info!(migration = %name, "migration applied");
    }

    Ok(())
}
