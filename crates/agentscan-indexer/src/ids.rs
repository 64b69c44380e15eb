//! Gapless scoped sequential ID allocation
//!
//! One `id_counters` row per scope. Allocation takes a transaction-scoped
//! advisory lock keyed by a stable hash of the scope string, then bumps the
//! counter with upsert-returning semantics. Callers allocate inside the same
//! transaction as their row insert, so a rollback returns the number — the
//! counter never advances without a committed row.

use crate::error::Result;
use crate::storage::EventTable;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

/// Offset used by the two-phase compaction rewrite. Must exceed any id a
/// live deployment can reach between compactions.
const RENUMBER_OFFSET: i64 = 1_000_000_000;

/// Advisory-lock key space for compaction, disjoint from scope hashes by
/// construction (scope strings never hash here).
const MAINTENANCE_LOCK_KEY: i64 = i64::from_le_bytes(*b"idcompct");

/// Scope for global agent numbering.
pub fn agent_scope() -> String {
    "agent:global".to_string()
}

/// Scope for per-asset feedback numbering.
pub fn feedback_scope(asset: &str) -> String {
    format!("feedback:{asset}")
}

/// Scope for per-(asset, client, feedback_index) response numbering.
pub fn response_scope(asset: &str, client: &str, feedback_index: i64) -> String {
    format!("response:{asset}:{client}:{feedback_index}")
}

/// Scope for per-asset revocation numbering.
pub fn revocation_scope(asset: &str) -> String {
    format!("revocation:{asset}")
}

/// Stable 64-bit advisory-lock key for a scope string.
pub fn scope_lock_key(scope: &str) -> i64 {
    let digest = Sha256::digest(scope.as_bytes());
    i64::from_le_bytes(digest[..8].try_into().expect("sha256 output is 32 bytes"))
}

/// Take the advisory lock for `scope` without allocating. Handlers use this
/// to make their duplicate-identity lookup and the subsequent allocation one
/// critical section. Re-taking the same lock inside `allocate` is fine; the
/// lock is session-reentrant and released at transaction end.
pub async fn lock_scope(tx: &mut Transaction<'_, Postgres>, scope: &str) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(scope_lock_key(scope))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Allocate the next id for `scope` inside the caller's transaction.
///
/// The advisory lock serializes writers on the same scope; the unique
/// constraint on the target table is the backstop. A fresh scope yields 1.
pub async fn allocate(tx: &mut Transaction<'_, Postgres>, scope: &str) -> Result<i64> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(scope_lock_key(scope))
        .execute(&mut **tx)
        .await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO id_counters (scope, next_value)
        VALUES ($1, 2)
        ON CONFLICT (scope) DO UPDATE SET next_value = id_counters.next_value + 1
        RETURNING next_value - 1
    "#,
    )
    .bind(scope)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

fn scope_partition(table: EventTable) -> (&'static str, &'static str) {
    // (PARTITION BY columns, scope-string SQL expression)
    match table {
        EventTable::Feedback => ("asset", "'feedback:' || asset"),
        EventTable::Response => (
            "asset, client_address, feedback_index",
            "'response:' || asset || ':' || client_address || ':' || feedback_index",
        ),
        EventTable::Revocation => ("asset", "'revocation:' || asset"),
    }
}

/// Densely renumber one event table's scoped ids to canonical order.
///
/// Maintenance/startup path. Two phases so the partial unique index never
/// sees a duplicate mid-rewrite: shift every live id by a large offset,
/// then assign `ROW_NUMBER()` over the canonical order per scope.
pub async fn compact_event_table(pool: &PgPool, table: EventTable) -> Result<u64> {
    let (partition, scope_expr) = scope_partition(table);
    let tbl = table.table();
    let id_col = table.id_column();

    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MAINTENANCE_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let shift = format!(
        "UPDATE {tbl} SET {id_col} = {id_col} + $1 WHERE {id_col} IS NOT NULL"
    );
    sqlx::query(&shift)
        .bind(RENUMBER_OFFSET)
        .execute(&mut *tx)
        .await?;

    let assign = format!(
        r#"
        WITH ranked AS (
            SELECT id, ROW_NUMBER() OVER (
                PARTITION BY {partition}
                ORDER BY slot, tx_signature, tx_index NULLS LAST, event_ordinal NULLS LAST, id
            ) AS rn
            FROM {tbl}
            WHERE status != 'ORPHANED'
        )
        UPDATE {tbl} t SET {id_col} = ranked.rn
        FROM ranked WHERE t.id = ranked.id
    "#
    );
    let renumbered = sqlx::query(&assign).execute(&mut *tx).await?.rows_affected();

    let counters = format!(
        r#"
        INSERT INTO id_counters (scope, next_value)
        SELECT {scope_expr}, COUNT(*) + 1
        FROM {tbl}
        WHERE status != 'ORPHANED'
        GROUP BY {partition}
        ON CONFLICT (scope) DO UPDATE SET next_value = EXCLUDED.next_value
    "#
    );
    sqlx::query(&counters).execute(&mut *tx).await?;

    tx.commit().await?;
    info!("Compacted {renumbered} {tbl} ids");
    Ok(renumbered)
}

/// Densely renumber the global agent ids to canonical order.
pub async fn compact_agents(pool: &PgPool) -> Result<u64> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MAINTENANCE_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE agents SET agent_id = agent_id + $1 WHERE agent_id IS NOT NULL")
        .bind(RENUMBER_OFFSET)
        .execute(&mut *tx)
        .await?;

    let renumbered = sqlx::query(
        r#"
        WITH ranked AS (
            SELECT id, ROW_NUMBER() OVER (
                ORDER BY slot, tx_signature, tx_index NULLS LAST, event_ordinal NULLS LAST, id
            ) AS rn
            FROM agents
            WHERE status != 'ORPHANED'
        )
        UPDATE agents a SET agent_id = ranked.rn
        FROM ranked WHERE a.id = ranked.id
    "#,
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query(
        r#"
        INSERT INTO id_counters (scope, next_value)
        SELECT 'agent:global', COUNT(*) + 1 FROM agents WHERE status != 'ORPHANED'
        ON CONFLICT (scope) DO UPDATE SET next_value = EXCLUDED.next_value
    "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Compacted {renumbered} agent ids");
    Ok(renumbered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_strings() {
        assert_eq!(agent_scope(), "agent:global");
        assert_eq!(feedback_scope("A"), "feedback:A");
        assert_eq!(response_scope("A", "C", 3), "response:A:C:3");
        assert_eq!(revocation_scope("A"), "revocation:A");
    }

    #[test]
    fn test_lock_key_is_stable() {
        let a = scope_lock_key("feedback:somebase58asset");
        let b = scope_lock_key("feedback:somebase58asset");
        assert_eq!(a, b);
    }

    #[test]
    fn test_lock_key_separates_scopes() {
        assert_ne!(scope_lock_key("feedback:A"), scope_lock_key("feedback:B"));
        assert_ne!(scope_lock_key("feedback:A"), scope_lock_key("revocation:A"));
        assert_ne!(scope_lock_key("agent:global"), MAINTENANCE_LOCK_KEY);
    }
}
