use archiver_types::{
    ColumnSchema, ForeignKeySchema, IndexSchema, PrimaryKeySchema, TableCheckConstraint,
    TableSchema, TableUniqueConstraint,
};
use chrono::Utc;

use crate::{connection::ConnectionPool, error::DalError};

/// Captures a table's definition from the system catalogs. The snapshot is
/// taken once per run and diffed against the previous run's snapshot by the
/// drift checker.
#[derive(Debug)]
pub struct SchemaDal<'a> {
    pool: &'a ConnectionPool,
}

impl<'a> SchemaDal<'a> {
    pub fn new(pool: &'a ConnectionPool) -> Self {
        Self { pool }
    }

    pub async fn detect_table_schema(
        &self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<TableSchema, DalError> {
        Ok(TableSchema {
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            columns: self.columns(schema_name, table_name).await?,
            primary_key: self.primary_key(schema_name, table_name).await?,
            foreign_keys: self.foreign_keys(schema_name, table_name).await?,
            indexes: self.indexes(schema_name, table_name).await?,
            check_constraints: self.check_constraints(schema_name, table_name).await?,
            unique_constraints: self.unique_constraints(schema_name, table_name).await?,
            captured_at: Utc::now(),
        })
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnSchema>, DalError> {
        let query = "SELECT column_name::text, data_type::text, is_nullable::text, \
                     column_default::text, ordinal_position::int4 \
                     FROM information_schema.columns \
                     WHERE table_schema = $1 AND table_name = $2 \
                     ORDER BY ordinal_position";
        let rows: Vec<(String, String, String, Option<String>, i32)> = sqlx::query_as(query)
            .bind(schema)
            .bind(table)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|err| DalError::query(self.pool.database(), query, err))?;

        Ok(rows
            .into_iter()
            .map(
                |(name, data_type, is_nullable, column_default, ordinal_position)| ColumnSchema {
                    name,
                    data_type,
                    is_nullable: is_nullable == "YES",
                    column_default,
                    ordinal_position,
                },
            )
            .collect())
    }

    async fn primary_key(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<PrimaryKeySchema>, DalError> {
        let query = "SELECT tc.constraint_name::text, \
                     array_agg(kcu.column_name::text ORDER BY kcu.ordinal_position) \
                     FROM information_schema.table_constraints tc \
                     JOIN information_schema.key_column_usage kcu \
                       ON kcu.constraint_name = tc.constraint_name \
                      AND kcu.table_schema = tc.table_schema \
                     WHERE tc.table_schema = $1 AND tc.table_name = $2 \
                       AND tc.constraint_type = 'PRIMARY KEY' \
                     GROUP BY tc.constraint_name";
        let row: Option<(String, Vec<String>)> = sqlx::query_as(query)
            .bind(schema)
            .bind(table)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|err| DalError::query(self.pool.database(), query, err))?;

        Ok(row.map(|(constraint_name, columns)| PrimaryKeySchema {
            constraint_name,
            columns,
        }))
    }

    async fn foreign_keys(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeySchema>, DalError> {
        let query = "SELECT tc.constraint_name::text, \
                     array_agg(DISTINCT kcu.column_name::text) AS columns, \
                     ccu.table_name::text AS referenced_table, \
                     array_agg(DISTINCT ccu.column_name::text) AS referenced_columns \
                     FROM information_schema.table_constraints tc \
                     JOIN information_schema.key_column_usage kcu \
                       ON kcu.constraint_name = tc.constraint_name \
                      AND kcu.table_schema = tc.table_schema \
                     JOIN information_schema.constraint_column_usage ccu \
                       ON ccu.constraint_name = tc.constraint_name \
                      AND ccu.table_schema = tc.table_schema \
                     WHERE tc.table_schema = $1 AND tc.table_name = $2 \
                       AND tc.constraint_type = 'FOREIGN KEY' \
                     GROUP BY tc.constraint_name, ccu.table_name \
                     ORDER BY tc.constraint_name";
        let rows: Vec<(String, Vec<String>, String, Vec<String>)> = sqlx::query_as(query)
            .bind(schema)
            .bind(table)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|err| DalError::query(self.pool.database(), query, err))?;

        Ok(rows
            .into_iter()
            .map(
                |(constraint_name, columns, referenced_table, referenced_columns)| {
                    ForeignKeySchema {
                        constraint_name,
                        columns,
                        referenced_table,
                        referenced_columns,
                    }
                },
            )
            .collect())
    }

    async fn indexes(&self, schema: &str, table: &str) -> Result<Vec<IndexSchema>, DalError> {
        let query = "SELECT indexname::text, indexdef::text \
                     FROM pg_indexes \
                     WHERE schemaname = $1 AND tablename = $2 \
                     ORDER BY indexname";
        let rows: Vec<(String, String)> = sqlx::query_as(query)
            .bind(schema)
            .bind(table)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|err| DalError::query(self.pool.database(), query, err))?;

        Ok(rows
            .into_iter()
            .map(|(name, definition)| {
                let is_unique = definition.starts_with("CREATE UNIQUE INDEX");
                IndexSchema {
                    name,
                    definition,
                    is_unique,
                }
            })
            .collect())
    }

    async fn check_constraints(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<TableCheckConstraint>, DalError> {
        let query = "SELECT con.conname::text, pg_get_constraintdef(con.oid) \
                     FROM pg_constraint con \
                     JOIN pg_class rel ON rel.oid = con.conrelid \
                     JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace \
                     WHERE con.contype = 'c' AND nsp.nspname = $1 AND rel.relname = $2 \
                     ORDER BY con.conname";
        let rows: Vec<(String, String)> = sqlx::query_as(query)
            .bind(schema)
            .bind(table)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|err| DalError::query(self.pool.database(), query, err))?;

        Ok(rows
            .into_iter()
            .map(|(name, expression)| TableCheckConstraint { name, expression })
            .collect())
    }

    async fn unique_constraints(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<TableUniqueConstraint>, DalError> {
        let query = "SELECT tc.constraint_name::text, \
                     array_agg(kcu.column_name::text ORDER BY kcu.ordinal_position) \
                     FROM information_schema.table_constraints tc \
                     JOIN information_schema.key_column_usage kcu \
                       ON kcu.constraint_name = tc.constraint_name \
                      AND kcu.table_schema = tc.table_schema \
                     WHERE tc.table_schema = $1 AND tc.table_name = $2 \
                       AND tc.constraint_type = 'UNIQUE' \
                     GROUP BY tc.constraint_name \
                     ORDER BY tc.constraint_name";
        let rows: Vec<(String, Vec<String>)> = sqlx::query_as(query)
            .bind(schema)
            .bind(table)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|err| DalError::query(self.pool.database(), query, err))?;

        Ok(rows
            .into_iter()
            .map(|(name, columns)| TableUniqueConstraint { name, columns })
            .collect())
    }
}
