//! Needs a reachable PostgreSQL. Run with `--ignored`; connection settings
//! come from `SQLASK_TEST_DB_*` and default to the application defaults.

use sqlask_engine::config::ConnectionParams;
use sqlask_engine::postgres::PostgresReader;
use sqlask_pipeline::{QueryError, QueryRunner};
use sqlx::{Connection, PgConnection};

fn params() -> ConnectionParams {
    let defaults = ConnectionParams::default();
    let var = |name: &str, default: String| std::env::var(name).unwrap_or(default);
    ConnectionParams {
        host: var("SQLASK_TEST_DB_HOST", defaults.host),
        port: var("SQLASK_TEST_DB_PORT", defaults.port.to_string())
            .parse()
            .unwrap(),
        user: var("SQLASK_TEST_DB_USER", defaults.user),
        password: var("SQLASK_TEST_DB_PASSWORD", defaults.password),
        database: var("SQLASK_TEST_DB_NAME", defaults.database),
    }
}

async fn seed(params: &ConnectionParams) {
    let mut conn = PgConnection::connect(&params.url()).await.unwrap();
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS players (
            player_id SERIAL PRIMARY KEY,
            first_name TEXT,
            last_name TEXT,
            position TEXT,
            team TEXT,
            age INTEGER,
            nationality TEXT
        );
        INSERT INTO players (first_name, last_name, position, team, age, nationality)
        SELECT 'Pedro', 'Gonzalez', 'Midfielder', 'Barcelona', 21, 'Spain'
        WHERE NOT EXISTS (SELECT 1 FROM players WHERE team = 'Barcelona');
        "#,
    )
    .execute(&mut conn)
    .await
    .unwrap();
    conn.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn zero_matching_rows_is_an_empty_table() {
    let params = params();
    seed(&params).await;
    let reader = PostgresReader::new(params);

    let table = reader
        .execute("SELECT * FROM players WHERE team='Nonexistent'")
        .await
        .unwrap();
    assert!(table.is_empty());
}

#[tokio::test]
#[ignore]
async fn malformed_sql_is_an_error() {
    let params = params();
    seed(&params).await;
    let reader = PostgresReader::new(params);

    let res = reader.execute("SELEC * FROM players").await;
    assert!(matches!(res, Err(QueryError::Execute(_))));
}

#[tokio::test]
#[ignore]
async fn count_and_typed_columns() {
    let params = params();
    seed(&params).await;
    let reader = PostgresReader::new(params);

    let table = reader.execute("SELECT COUNT(*) FROM players").await.unwrap();
    assert_eq!(table.columns, vec!["count"]);
    assert!(table.rows[0][0].as_i64().unwrap() >= 1);

    let table = reader
        .execute("SELECT first_name, age, AVG(age) OVER () AS avg_age FROM players WHERE team='Barcelona'")
        .await
        .unwrap();
    let record = table.records().next().unwrap();
    assert!(record["first_name"].is_string());
    assert!(record["age"].is_i64());
    assert!(!record["avg_age"].is_null());
}

#[tokio::test]
#[ignore]
async fn aggregated_arrays_decode_element_wise() {
    let params = params();
    seed(&params).await;
    let reader = PostgresReader::new(params);

    let table = reader
        .execute("SELECT array_agg(first_name) AS names, array_agg(age) AS ages FROM players WHERE team='Barcelona'")
        .await
        .unwrap();
    let record = table.records().next().unwrap();
    let names = record["names"].as_array().unwrap();
    assert!(names.iter().any(|n| n == "Pedro"));
    assert!(record["ages"].as_array().unwrap()[0].is_i64());
}

#[tokio::test]
#[ignore]
async fn intervals_times_and_uuids_are_text() {
    let reader = PostgresReader::new(params());

    let table = reader
        .execute(
            "SELECT INTERVAL '2 days' AS span, TIME '04:05:06' AS at, \
             '6f1c2d9e-0b7a-4f53-9a39-3c8f8a1d2e40'::uuid AS id, NULL::point AS p",
        )
        .await
        .unwrap();
    let record = table.records().next().unwrap();
    assert_eq!(record["span"], "2 days");
    assert_eq!(record["at"], "04:05:06");
    assert_eq!(record["id"], "6f1c2d9e-0b7a-4f53-9a39-3c8f8a1d2e40");
    assert!(record["p"].is_null());
}
