use sqlx::PgPool;

/// Creates the connector's tables in the discovery database when missing.
///
/// `sync_profiles` stores watermarks as epoch seconds; `ils_hold_summary` is
/// rebuilt wholesale every cycle.
pub async fn migrate_discovery_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "create table if not exists sync_profiles ( \
           profile_name text primary key, \
           last_changed_records bigint, \
           last_full_update bigint, \
           last_bulk_export bigint, \
           run_full_update boolean not null default false \
         )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "create table if not exists ils_hold_summary ( \
           ils_id text primary key, \
           num_holds bigint not null \
         )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
