use crate::config::ConnectionParams;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlask_pipeline::{QueryError, QueryRunner, ResultTable};
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Connection, Row, TypeInfo};

/// Runs each query on its own short-lived connection. No pool.
pub struct PostgresReader {
    params: ConnectionParams,
}

impl PostgresReader {
    pub fn new(params: ConnectionParams) -> Self {
        Self { params }
    }

    pub async fn read(&self, sql: &str) -> Result<ResultTable, QueryError> {
        let mut conn = PgConnection::connect(&self.params.url())
            .await
            .map_err(|e| QueryError::Connect(e.to_string()))?;

        // an error here drops `conn`, which closes the socket
        let rows = sqlx::query(sql)
            .fetch_all(&mut conn)
            .await
            .map_err(|e| QueryError::Execute(e.to_string()))?;

        if let Err(e) = conn.close().await {
            log::debug!("closing connection: {}", e);
        }

        Ok(rows_to_table(&rows))
    }
}

#[async_trait]
impl QueryRunner for PostgresReader {
    // failures are reported by the caller, which knows what the query was for
    async fn execute(&self, sql: &str) -> Result<ResultTable, QueryError> {
        let res = self.read(sql).await;
        if let Ok(table) = &res {
            log::debug!("query returned {} rows", table.row_count());
        }
        res
    }
}

fn rows_to_table(rows: &[PgRow]) -> ResultTable {
    let columns: Vec<String> = rows
        .first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let out_rows = rows
        .iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, col)| extract_value(row, i, col.type_info().name()))
                .collect()
        })
        .collect();

    ResultTable::new(columns, out_rows)
}

/// Decode one cell by its Postgres type name. Types with no mapping become `null`.
fn extract_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let upper = type_name.to_uppercase();

    if let Some(elem) = array_element_type(&upper) {
        return extract_array(row, index, elem);
    }

    let decoded = match upper.as_str() {
        "INT2" | "SMALLINT" => row.try_get::<Option<i16>, _>(index).map(|v| v.map(Value::from)),
        "INT4" | "INT" | "INTEGER" | "SERIAL" => {
            row.try_get::<Option<i32>, _>(index).map(|v| v.map(Value::from))
        }
        "INT8" | "BIGINT" | "BIGSERIAL" => {
            row.try_get::<Option<i64>, _>(index).map(|v| v.map(Value::from))
        }
        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .map(|v| v.map(|n| float_value(n as f64))),
        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .map(|v| v.map(float_value)),
        "NUMERIC" | "DECIMAL" => row
            .try_get::<Option<Decimal>, _>(index)
            .map(|v| v.map(decimal_value)),
        "BOOL" | "BOOLEAN" => row.try_get::<Option<bool>, _>(index).map(|v| v.map(Value::from)),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            row.try_get::<Option<String>, _>(index).map(|v| v.map(Value::String))
        }
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)
            .map(|v| v.map(|u| Value::String(u.to_string()))),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .map(|v| v.map(|d| Value::String(d.to_string()))),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)
            .map(|v| v.map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .map(|v| v.map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .map(|v| v.map(|dt| Value::String(dt.to_rfc3339()))),
        "INTERVAL" => row
            .try_get::<Option<PgInterval>, _>(index)
            .map(|v| v.map(|i| Value::String(format_interval(&i)))),
        _ => {
            log::debug!("no decoder for column type {}", type_name);
            return Value::Null;
        }
    };

    match decoded {
        Ok(v) => v.unwrap_or(Value::Null),
        Err(e) => {
            log::debug!("decoding {} column {}: {}", type_name, index, e);
            Value::Null
        }
    }
}

/// Element type of an array type name: `_INT4` or `INT4[]` -> `INT4`.
fn array_element_type(upper: &str) -> Option<&str> {
    upper
        .strip_suffix("[]")
        .or_else(|| upper.strip_prefix('_'))
}

fn extract_array(row: &PgRow, index: usize, elem: &str) -> Value {
    fn to_array<T>(items: Option<Vec<Option<T>>>, f: impl Fn(T) -> Value) -> Value {
        match items {
            Some(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| item.map(&f).unwrap_or(Value::Null))
                    .collect(),
            ),
            None => Value::Null,
        }
    }

    let decoded = match elem {
        "INT2" => row
            .try_get::<Option<Vec<Option<i16>>>, _>(index)
            .map(|v| to_array(v, Value::from)),
        "INT4" => row
            .try_get::<Option<Vec<Option<i32>>>, _>(index)
            .map(|v| to_array(v, Value::from)),
        "INT8" => row
            .try_get::<Option<Vec<Option<i64>>>, _>(index)
            .map(|v| to_array(v, Value::from)),
        "FLOAT4" => row
            .try_get::<Option<Vec<Option<f32>>>, _>(index)
            .map(|v| to_array(v, |n| float_value(n as f64))),
        "FLOAT8" => row
            .try_get::<Option<Vec<Option<f64>>>, _>(index)
            .map(|v| to_array(v, float_value)),
        "NUMERIC" => row
            .try_get::<Option<Vec<Option<Decimal>>>, _>(index)
            .map(|v| to_array(v, decimal_value)),
        "BOOL" => row
            .try_get::<Option<Vec<Option<bool>>>, _>(index)
            .map(|v| to_array(v, Value::from)),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
            .try_get::<Option<Vec<Option<String>>>, _>(index)
            .map(|v| to_array(v, Value::String)),
        "UUID" => row
            .try_get::<Option<Vec<Option<uuid::Uuid>>>, _>(index)
            .map(|v| to_array(v, |u| Value::String(u.to_string()))),
        "DATE" => row
            .try_get::<Option<Vec<Option<chrono::NaiveDate>>>, _>(index)
            .map(|v| to_array(v, |d| Value::String(d.to_string()))),
        _ => {
            log::debug!("no decoder for array of {}", elem);
            return Value::Null;
        }
    };

    decoded.unwrap_or_else(|e| {
        log::debug!("decoding {}[] column {}: {}", elem, index, e);
        Value::Null
    })
}

fn float_value(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(n.to_string()))
}

fn decimal_value(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Ok(i) = i64::try_from(d) {
            return Value::from(i);
        }
    }
    Value::String(d.normalize().to_string())
}

/// Render an interval the way psql does: `1 year 2 mons 3 days 04:05:06.5`.
fn format_interval(interval: &PgInterval) -> String {
    fn unit(n: i64, singular: &str, plural: &str) -> String {
        format!("{} {}", n, if n.abs() == 1 { singular } else { plural })
    }

    let mut parts = Vec::new();
    let years = (interval.months / 12) as i64;
    let months = (interval.months % 12) as i64;
    if years != 0 {
        parts.push(unit(years, "year", "years"));
    }
    if months != 0 {
        parts.push(unit(months, "mon", "mons"));
    }
    if interval.days != 0 {
        parts.push(unit(interval.days as i64, "day", "days"));
    }

    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let micros = interval.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let frac = micros % 1_000_000;
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        );
        if frac != 0 {
            let digits = format!("{:06}", frac);
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn interval(months: i32, days: i32, microseconds: i64) -> PgInterval {
        PgInterval {
            months,
            days,
            microseconds,
        }
    }

    #[test]
    fn decimals_keep_precision() {
        assert_eq!(decimal_value(Decimal::from_str("25.5000").unwrap()), Value::from("25.5"));
        assert_eq!(decimal_value(Decimal::from_str("42").unwrap()), Value::from(42));
    }

    #[test]
    fn non_finite_floats_become_text() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), Value::from("NaN"));
    }

    #[test]
    fn array_type_names() {
        assert_eq!(array_element_type("_TEXT"), Some("TEXT"));
        assert_eq!(array_element_type("INT4[]"), Some("INT4"));
        assert_eq!(array_element_type("INTERVAL"), None);
    }

    #[test]
    fn intervals_read_like_psql() {
        assert_eq!(format_interval(&interval(0, 2, 0)), "2 days");
        assert_eq!(format_interval(&interval(14, 1, 0)), "1 year 2 mons 1 day");
        assert_eq!(
            format_interval(&interval(0, 0, 3_723_500_000)),
            "01:02:03.5"
        );
        assert_eq!(format_interval(&interval(0, 3, -60_000_000)), "3 days -00:01:00");
        assert_eq!(format_interval(&interval(0, 0, 0)), "00:00:00");
    }

    #[tokio::test]
    async fn unreachable_database_is_an_error_value() {
        let reader = PostgresReader::new(ConnectionParams {
            host: "127.0.0.1".to_string(),
            port: 9,
            ..ConnectionParams::default()
        });
        let res = reader.execute("SELECT 1").await;
        assert!(matches!(res, Err(QueryError::Connect(_))));
    }
}
