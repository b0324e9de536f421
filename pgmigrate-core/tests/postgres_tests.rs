//! Live Postgres tests
//!
//! Skipped unless both `PGMIGRATE_TEST_SOURCE_URL` and
//! `PGMIGRATE_TEST_TARGET_URL` point at scratch databases. Each test works
//! on uniquely named objects and drops them afterwards.
//!
//! Run with: cargo test --test postgres_tests -- --nocapture

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use pgmigrate_core::adapters::postgres::PgDatabase;
use pgmigrate_core::domain::{EnumOutcome, Manifest, TableDescriptor};
use pgmigrate_core::services::{InspectService, MigrationPlan, MigrationService, NoopObserver};

fn urls() -> Option<(String, String)> {
    let source = std::env::var("PGMIGRATE_TEST_SOURCE_URL").ok()?;
    let target = std::env::var("PGMIGRATE_TEST_TARGET_URL").ok()?;
    Some((source, target))
}

async fn pool(url: &str) -> PgPool {
    PgPoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .expect("Failed to connect")
}

async fn exec(pool: &PgPool, sql: &str) {
    sqlx::raw_sql(sql).execute(pool).await.expect(sql);
}

#[tokio::test]
async fn test_copy_table_with_enum_and_sequence() {
    let Some((source_url, target_url)) = urls() else {
        println!("PGMIGRATE_TEST_*_URL not set, skipping");
        return;
    };

    let suffix = Uuid::new_v4().simple().to_string()[..8].to_string();
    let table = format!("it_papers_{}", suffix);
    let kind = format!("it_kind_{}", suffix);
    let sequence = format!("{}_id_seq", table);

    let src = pool(&source_url).await;
    let dst = pool(&target_url).await;
    exec(
        &src,
        &format!(
            "CREATE TYPE \"{kind}\" AS ENUM ('OTHER', 'ENDTERM', 'QUIZ');
             CREATE TABLE \"{table}\" (id serial PRIMARY KEY, title varchar(80) NOT NULL, kind \"{kind}\");
             INSERT INTO \"{table}\" (id, title, kind) VALUES
               (3, 'Intro', 'QUIZ'), (7, 'Midway', 'OTHER'), (12, 'Final', 'ENDTERM');"
        ),
    )
    .await;

    let source = Arc::new(PgDatabase::connect(&source_url).await.unwrap());
    let target = Arc::new(PgDatabase::connect(&target_url).await.unwrap());

    let inspect = InspectService::new(source.clone());
    let ddl = inspect.describe_table(&table).await.unwrap();
    assert!(ddl.contains("\"title\" character varying(80) NOT NULL"));
    assert!(ddl.contains(&format!("nextval('{}'::regclass)", sequence)));

    let enums = inspect.enumerate_enum_types().await.unwrap();
    let plan = MigrationPlan::new(
        Manifest::new(vec![TableDescriptor::new(&table, ddl, 3)]),
        vec![pgmigrate_core::EnumDescriptor::new(&kind, enums[&kind].clone()).unwrap()],
    );

    let service = MigrationService::new(source.clone(), target.clone());
    let first = service.migrate(&plan, &NoopObserver).await.unwrap();
    let second = service.migrate(&plan, &NoopObserver).await.unwrap();

    assert_eq!(first.enum_outcome(&kind), Some(&EnumOutcome::Created));
    assert_eq!(first.table(&table).unwrap().inserted, 3);
    assert_eq!(second.enum_outcome(&kind), Some(&EnumOutcome::Skipped));
    assert_eq!(second.table(&table).unwrap().skipped, 3);

    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
        .fetch_one(&dst)
        .await
        .unwrap();
    assert_eq!(count, 3);

    let next: i64 = sqlx::query_scalar("SELECT nextval($1::regclass)")
        .bind(&sequence)
        .fetch_one(&dst)
        .await
        .unwrap();
    assert!(next >= 13);

    let ordered: bool = sqlx::query_scalar(&format!(
        "SELECT 'ENDTERM'::\"{kind}\" < 'QUIZ'::\"{kind}\""
    ))
    .fetch_one(&dst)
    .await
    .unwrap();
    assert!(ordered);

    source.close().await;
    target.close().await;
    for db in [&src, &dst] {
        exec(
            db,
            &format!("DROP TABLE IF EXISTS \"{table}\"; DROP TYPE IF EXISTS \"{kind}\";"),
        )
        .await;
    }
    exec(&dst, &format!("DROP SEQUENCE IF EXISTS \"{}\"", sequence)).await;
}
