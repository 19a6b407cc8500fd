//! SQLite tool registry implementation.

use chrono::Utc;
use jobflow_core::repository::tool::ToolRegistry;
use jobflow_types::error::RepositoryError;
use jobflow_types::tool::{Tool, ToolStatus};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `ToolRegistry`.
#[derive(Clone)]
pub struct SqliteToolRegistry {
    pool: DatabasePool,
}

impl SqliteToolRegistry {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct ToolRow {
    id: String,
    name: String,
    description: Option<String>,
    endpoint: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl ToolRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            endpoint: row.try_get("endpoint")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_tool(self) -> Result<Tool, RepositoryError> {
        Ok(Tool {
            id: self.id,
            name: self.name,
            description: self.description,
            endpoint: self.endpoint,
            status: self.status.parse().map_err(RepositoryError::Query)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

impl ToolRegistry for SqliteToolRegistry {
    async fn register(&self, tool: &Tool) -> Result<(), RepositoryError> {
        // Re-registering keeps the original created_at.
        sqlx::query(
            r#"INSERT INTO tools (id, name, description, endpoint, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   description = excluded.description,
                   endpoint = excluded.endpoint,
                   status = excluded.status,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&tool.id)
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(&tool.endpoint)
        .bind(tool.status.as_str())
        .bind(format_datetime(&tool.created_at))
        .bind(format_datetime(&tool.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn find_by_id(&self, tool_id: &str) -> Result<Option<Tool>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, endpoint, status, created_at, updated_at FROM tools WHERE id = ?",
        )
        .bind(tool_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(ToolRow::from_row(&row).map_err(query_error)?.into_tool()?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Tool>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, description, endpoint, status, created_at, updated_at FROM tools ORDER BY id",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut tools = Vec::with_capacity(rows.len());
        for row in &rows {
            tools.push(ToolRow::from_row(row).map_err(query_error)?.into_tool()?);
        }
        Ok(tools)
    }

    async fn set_status(&self, tool_id: &str, status: ToolStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE tools SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_datetime(&Utc::now()))
            .bind(tool_id)
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
