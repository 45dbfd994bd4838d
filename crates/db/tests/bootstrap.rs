use sqlx::PgPool;

/// Connect, migrate, and verify the pool answers.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_health_check(pool: PgPool) {
    pumpflix_db::health_check(&pool).await.unwrap();
}

/// All `id` columns must be bigint.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_all_pks_are_bigint(pool: PgPool) {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT table_name, data_type
         FROM information_schema.columns
         WHERE column_name = 'id'
           AND table_schema = 'public'
           AND table_name != '_sqlx_migrations'
         ORDER BY table_name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(!rows.is_empty());
    for (table, data_type) in &rows {
        assert_eq!(data_type, "bigint", "Table {table}.id should be bigint");
    }
}

/// Unique constraints follow the `uq_` naming the API relies on to map
/// violations to 409.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unique_constraints_are_prefixed(pool: PgPool) {
    let names: Vec<(String,)> = sqlx::query_as(
        "SELECT conname::TEXT FROM pg_constraint c
         JOIN pg_namespace n ON n.oid = c.connamespace
         WHERE c.contype = 'u' AND n.nspname = 'public'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert!(names.len() >= 8);
    for (name,) in &names {
        assert!(name.starts_with("uq_"), "constraint {name} should start with uq_");
    }
}
