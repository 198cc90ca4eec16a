//! Dynamic per-hook feature tables: safe DDL and chunked bulk insert.
//!
//! All feature tables live in a single `features` PG schema. The table name
//! is the hook name; both it and every column name pass the safe-identifier
//! grammar before any SQL text is assembled; that grammar is the injection
//! boundary. Column *values* are always bound parameters, never spliced.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use osa_handlers::ports::FeatureStore;
use osa_types::{ColumnDef, FeatureSchema, HookDefinition, JsonType, OsaError, SafeIdent};

pub const FEATURES_SCHEMA: &str = "features";

/// Rows per INSERT statement.
const INSERT_CHUNK: usize = 1000;

/// Fixed `(json_type, format)` → Postgres type mapping. Unknown formats fall
/// back to the base type.
pub fn pg_type_for(json_type: JsonType, format: Option<&str>) -> &'static str {
    match (json_type, format) {
        (JsonType::String, Some("date-time")) => "timestamptz",
        (JsonType::String, Some("date")) => "date",
        (JsonType::String, Some("uuid")) => "uuid",
        (JsonType::String, _) => "text",
        (JsonType::Number, _) => "double precision",
        (JsonType::Integer, _) => "bigint",
        (JsonType::Boolean, _) => "boolean",
        (JsonType::Array, _) | (JsonType::Object, _) => "jsonb",
    }
}

/// Render the CREATE TABLE statement for a hook's feature table. Inputs are
/// already grammar-validated `SafeIdent`s.
fn render_create_table(hook_name: &SafeIdent, columns: &[ColumnDef]) -> String {
    let mut ddl = format!(
        "create table \"{FEATURES_SCHEMA}\".\"{hook_name}\" (\n    \
         id bigserial primary key,\n    \
         record_srn text not null,\n    \
         created_at timestamptz not null default now()"
    );
    for col in columns {
        let pg_type = pg_type_for(col.json_type, col.format.as_deref());
        let not_null = if col.required { " not null" } else { "" };
        ddl.push_str(&format!(",\n    \"{}\" {pg_type}{not_null}", col.name));
    }
    ddl.push_str("\n)");
    ddl
}

fn render_record_srn_index(hook_name: &SafeIdent) -> String {
    format!(
        "create index \"idx_features_{hook_name}_record_srn\" \
         on \"{FEATURES_SCHEMA}\".\"{hook_name}\" (record_srn)"
    )
}

/// A row value converted to its column's bind type ahead of statement
/// building, so conversion failures surface before any SQL executes.
#[derive(Debug)]
enum Cell {
    Text(Option<String>),
    Timestamp(Option<DateTime<Utc>>),
    Date(Option<NaiveDate>),
    Uuid(Option<Uuid>),
    Double(Option<f64>),
    BigInt(Option<i64>),
    Bool(Option<bool>),
    Json(Option<Value>),
}

fn cell_for(col: &ColumnDef, value: Option<&Value>) -> Result<Cell> {
    let name = col.name.as_str();
    let value = match value {
        None | Some(Value::Null) => {
            return Ok(match (col.json_type, col.format.as_deref()) {
                (JsonType::String, Some("date-time")) => Cell::Timestamp(None),
                (JsonType::String, Some("date")) => Cell::Date(None),
                (JsonType::String, Some("uuid")) => Cell::Uuid(None),
                (JsonType::String, _) => Cell::Text(None),
                (JsonType::Number, _) => Cell::Double(None),
                (JsonType::Integer, _) => Cell::BigInt(None),
                (JsonType::Boolean, _) => Cell::Bool(None),
                (JsonType::Array, _) | (JsonType::Object, _) => Cell::Json(None),
            });
        }
        Some(value) => value,
    };

    let mismatch = || anyhow!(OsaError::validation_field("type mismatch", name));

    Ok(match (col.json_type, col.format.as_deref()) {
        (JsonType::String, Some("date-time")) => {
            let text = value.as_str().ok_or_else(mismatch)?;
            let ts = DateTime::parse_from_rfc3339(text)
                .map_err(|_| anyhow!(OsaError::validation_field("invalid date-time", name)))?;
            Cell::Timestamp(Some(ts.with_timezone(&Utc)))
        }
        (JsonType::String, Some("date")) => {
            let text = value.as_str().ok_or_else(mismatch)?;
            let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map_err(|_| anyhow!(OsaError::validation_field("invalid date", name)))?;
            Cell::Date(Some(date))
        }
        (JsonType::String, Some("uuid")) => {
            let text = value.as_str().ok_or_else(mismatch)?;
            let uuid = Uuid::parse_str(text)
                .map_err(|_| anyhow!(OsaError::validation_field("invalid uuid", name)))?;
            Cell::Uuid(Some(uuid))
        }
        (JsonType::String, _) => Cell::Text(Some(value.as_str().ok_or_else(mismatch)?.to_string())),
        (JsonType::Number, _) => Cell::Double(Some(value.as_f64().ok_or_else(mismatch)?)),
        (JsonType::Integer, _) => Cell::BigInt(Some(value.as_i64().ok_or_else(mismatch)?)),
        (JsonType::Boolean, _) => Cell::Bool(Some(value.as_bool().ok_or_else(mismatch)?)),
        // Arrays and objects land in jsonb columns as-is.
        (JsonType::Array, _) | (JsonType::Object, _) => Cell::Json(Some(value.clone())),
    })
}

pub struct PgFeatureStore {
    pool: PgPool,
}

impl PgFeatureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn catalog_schema(&self, hook_name: &str) -> Result<Option<FeatureSchema>> {
        let row = sqlx::query(
            "select feature_schema from feature_tables where hook_name = $1",
        )
        .bind(hook_name)
        .fetch_optional(&self.pool)
        .await
        .context("feature_tables lookup failed")?;

        row.map(|row| {
            let json: Value = row.try_get("feature_schema")?;
            serde_json::from_value(json).context("deserialize catalog feature schema")
        })
        .transpose()
    }
}

#[async_trait]
impl FeatureStore for PgFeatureStore {
    async fn create_table(&self, hook_name: &str, hook: &HookDefinition) -> Result<()> {
        // Injection boundary: reject before assembling any DDL.
        let ident = SafeIdent::new(hook_name)?;

        let schema = &hook.manifest.feature_schema;
        if let Some(existing) = self.catalog_schema(ident.as_str()).await? {
            if existing == *schema {
                // Same name, same schema: idempotent re-create.
                return Ok(());
            }
            return Err(anyhow!(OsaError::conflict(format!(
                "feature table already exists with a different schema: {ident}"
            ))));
        }

        let mut tx = self.pool.begin().await.context("begin create_table tx")?;

        sqlx::query(&format!("create schema if not exists \"{FEATURES_SCHEMA}\""))
            .execute(&mut *tx)
            .await
            .context("ensure features schema")?;

        sqlx::query(&render_create_table(&ident, &schema.columns))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("create feature table {ident}"))?;

        sqlx::query(&render_record_srn_index(&ident))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("index feature table {ident}"))?;

        sqlx::query(
            r#"
            insert into feature_tables (hook_name, pg_table, feature_schema, schema_version)
            values ($1, $2, $3, 1)
            "#,
        )
        .bind(ident.as_str())
        .bind(ident.as_str())
        .bind(serde_json::to_value(schema)?)
        .execute(&mut *tx)
        .await
        .context("register feature table")?;

        tx.commit().await.context("commit create_table tx")?;
        Ok(())
    }

    async fn insert_features(
        &self,
        hook_name: &str,
        record_srn: &str,
        rows: &[Value],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let ident = SafeIdent::new(hook_name)?;
        let schema = self
            .catalog_schema(ident.as_str())
            .await?
            .ok_or_else(|| anyhow!(OsaError::not_found(format!("feature table: {ident}"))))?;

        // Convert every row up front; a bad value aborts before the delete.
        let mut converted: Vec<Vec<Cell>> = Vec::with_capacity(rows.len());
        for row in rows {
            let object = row
                .as_object()
                .ok_or_else(|| anyhow!(OsaError::validation("feature row must be an object")))?;
            for key in object.keys() {
                if !schema.columns.iter().any(|c| c.name.as_str() == key) {
                    return Err(anyhow!(OsaError::validation_field(
                        format!("unknown feature column: {key}"),
                        key.clone(),
                    )));
                }
            }
            let cells = schema
                .columns
                .iter()
                .map(|col| cell_for(col, object.get(col.name.as_str())))
                .collect::<Result<Vec<Cell>>>()?;
            converted.push(cells);
        }

        let column_list = schema
            .columns
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await.context("begin insert tx")?;

        // Delete-then-insert keyed on record_srn keeps re-delivery of the
        // publication event from duplicating features.
        sqlx::query(&format!(
            "delete from \"{FEATURES_SCHEMA}\".\"{ident}\" where record_srn = $1"
        ))
        .bind(record_srn)
        .execute(&mut *tx)
        .await
        .context("delete previous features")?;

        let mut total: u64 = 0;
        for chunk in converted.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
                "insert into \"{FEATURES_SCHEMA}\".\"{ident}\" (record_srn, {column_list}) "
            ));
            builder.push_values(chunk, |mut b, cells| {
                b.push_bind(record_srn);
                for cell in cells {
                    match cell {
                        Cell::Text(v) => b.push_bind(v.clone()),
                        Cell::Timestamp(v) => b.push_bind(*v),
                        Cell::Date(v) => b.push_bind(*v),
                        Cell::Uuid(v) => b.push_bind(*v),
                        Cell::Double(v) => b.push_bind(*v),
                        Cell::BigInt(v) => b.push_bind(*v),
                        Cell::Bool(v) => b.push_bind(*v),
                        Cell::Json(v) => b.push_bind(v.clone()),
                    };
                }
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .context("insert feature chunk")?;
            total += chunk.len() as u64;
        }

        tx.commit().await.context("commit insert tx")?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(name: &str, json_type: JsonType, format: Option<&str>, required: bool) -> ColumnDef {
        ColumnDef {
            name: SafeIdent::new(name).unwrap(),
            json_type,
            format: format.map(str::to_string),
            required,
        }
    }

    #[test]
    fn type_mapping_is_fixed() {
        assert_eq!(pg_type_for(JsonType::String, None), "text");
        assert_eq!(pg_type_for(JsonType::String, Some("date-time")), "timestamptz");
        assert_eq!(pg_type_for(JsonType::String, Some("date")), "date");
        assert_eq!(pg_type_for(JsonType::String, Some("uuid")), "uuid");
        assert_eq!(pg_type_for(JsonType::Number, None), "double precision");
        assert_eq!(pg_type_for(JsonType::Integer, None), "bigint");
        assert_eq!(pg_type_for(JsonType::Boolean, None), "boolean");
        assert_eq!(pg_type_for(JsonType::Array, None), "jsonb");
        assert_eq!(pg_type_for(JsonType::Object, None), "jsonb");
        // Unknown format falls back to the base type.
        assert_eq!(pg_type_for(JsonType::String, Some("email")), "text");
    }

    #[test]
    fn ddl_includes_mandatory_columns_and_constraints() {
        let name = SafeIdent::new("pocket_detect").unwrap();
        let ddl = render_create_table(
            &name,
            &[
                col("pocket_id", JsonType::Integer, None, true),
                col("volume", JsonType::Number, None, false),
                col("tags", JsonType::Array, None, false),
            ],
        );
        assert!(ddl.starts_with("create table \"features\".\"pocket_detect\""));
        assert!(ddl.contains("id bigserial primary key"));
        assert!(ddl.contains("record_srn text not null"));
        assert!(ddl.contains("created_at timestamptz not null default now()"));
        assert!(ddl.contains("\"pocket_id\" bigint not null"));
        assert!(ddl.contains("\"volume\" double precision,"));
        assert!(ddl.contains("\"tags\" jsonb"));
    }

    #[test]
    fn cells_convert_typed_values() {
        let c = col("when", JsonType::String, Some("date-time"), false);
        match cell_for(&c, Some(&json!("2026-03-01T12:00:00Z"))).unwrap() {
            Cell::Timestamp(Some(ts)) => assert_eq!(ts.to_rfc3339(), "2026-03-01T12:00:00+00:00"),
            _ => panic!("wrong cell"),
        }

        let c = col("day", JsonType::String, Some("date"), false);
        assert!(matches!(
            cell_for(&c, Some(&json!("2026-03-01"))).unwrap(),
            Cell::Date(Some(_))
        ));

        let c = col("count", JsonType::Integer, None, false);
        assert!(matches!(
            cell_for(&c, Some(&json!(42))).unwrap(),
            Cell::BigInt(Some(42))
        ));

        let c = col("tags", JsonType::Array, None, false);
        assert!(matches!(
            cell_for(&c, Some(&json!(["a", "b"]))).unwrap(),
            Cell::Json(Some(_))
        ));
    }

    #[test]
    fn cell_type_mismatches_are_validation_errors() {
        let c = col("count", JsonType::Integer, None, false);
        let err = cell_for(&c, Some(&json!("not a number"))).unwrap_err();
        let osa = err.downcast_ref::<OsaError>().expect("OsaError");
        assert_eq!(osa.code(), "validation");

        let c = col("when", JsonType::String, Some("date-time"), false);
        assert!(cell_for(&c, Some(&json!("yesterday"))).is_err());
    }

    #[test]
    fn missing_values_become_nulls() {
        let c = col("volume", JsonType::Number, None, false);
        assert!(matches!(cell_for(&c, None).unwrap(), Cell::Double(None)));
        assert!(matches!(
            cell_for(&c, Some(&Value::Null)).unwrap(),
            Cell::Double(None)
        ));
    }
}
