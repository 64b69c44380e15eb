//! PostgreSQL storage layer
//!
//! Schema management, cursor state and the verifier-side queries. Event
//! write SQL that has to share the flush transaction lives in `handlers`.

use crate::error::Result;
use crate::models::*;
use agentscan_core::{ChainType, RowStatus};
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// Event-row tables that carry a scoped sequential id and a hash chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTable {
    Feedback,
    Response,
    Revocation,
}

impl EventTable {
    pub fn table(&self) -> &'static str {
        match self {
            EventTable::Feedback => "feedbacks",
            EventTable::Response => "responses",
            EventTable::Revocation => "revocations",
        }
    }

    pub fn id_column(&self) -> &'static str {
        match self {
            EventTable::Feedback => "feedback_id",
            EventTable::Response => "response_id",
            EventTable::Revocation => "revocation_id",
        }
    }

    pub fn chain_type(&self) -> ChainType {
        match self {
            EventTable::Feedback => ChainType::Feedback,
            EventTable::Response => ChainType::Response,
            EventTable::Revocation => ChainType::Revoke,
        }
    }
}

/// PostgreSQL storage for indexed data
pub struct Storage {
    pool: PgPool,
}

impl Storage {
    /// Connect to PostgreSQL
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id BIGSERIAL PRIMARY KEY,
                agent_id BIGINT,
                asset TEXT NOT NULL UNIQUE,
                owner TEXT NOT NULL,
                collection_pointer TEXT NOT NULL,
                creator TEXT NOT NULL,
                parent_asset TEXT,
                agent_uri TEXT,
                wallet TEXT,
                atom_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                trust_tier SMALLINT,
                quality_score INT,
                confidence INT,
                risk_score SMALLINT,
                diversity_ratio SMALLINT,
                feedback_digest BYTEA,
                feedback_count BIGINT NOT NULL DEFAULT 0,
                response_digest BYTEA,
                response_count BIGINT NOT NULL DEFAULT 0,
                revoke_digest BYTEA,
                revoke_count BIGINT NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'PENDING',
                verified_at TIMESTAMPTZ,
                verified_slot BIGINT,
                slot BIGINT NOT NULL,
                tx_signature TEXT NOT NULL,
                tx_index INT,
                event_ordinal INT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feedbacks (
                id BIGSERIAL PRIMARY KEY,
                feedback_id BIGINT,
                asset TEXT NOT NULL,
                client_address TEXT NOT NULL,
                feedback_index BIGINT NOT NULL,
                value BIGINT NOT NULL,
                value_decimals SMALLINT NOT NULL DEFAULT 0,
                score SMALLINT NOT NULL,
                tag1 TEXT NOT NULL DEFAULT '',
                tag2 TEXT NOT NULL DEFAULT '',
                endpoint TEXT,
                feedback_uri TEXT,
                feedback_hash BYTEA,
                running_digest BYTEA,
                is_revoked BOOLEAN NOT NULL DEFAULT FALSE,
                status TEXT NOT NULL DEFAULT 'PENDING',
                slot BIGINT NOT NULL,
                tx_signature TEXT NOT NULL,
                tx_index INT,
                event_ordinal INT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                revoked_at TIMESTAMPTZ,
                UNIQUE (asset, client_address, feedback_index)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                id BIGSERIAL PRIMARY KEY,
                response_id BIGINT,
                asset TEXT NOT NULL,
                client_address TEXT NOT NULL,
                feedback_index BIGINT NOT NULL,
                responder TEXT NOT NULL,
                response_uri TEXT,
                response_hash BYTEA,
                running_digest BYTEA,
                response_count BIGINT NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'PENDING',
                slot BIGINT NOT NULL,
                tx_signature TEXT NOT NULL,
                tx_index INT,
                event_ordinal INT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (asset, client_address, feedback_index, responder, tx_signature)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS revocations (
                id BIGSERIAL PRIMARY KEY,
                revocation_id BIGINT,
                asset TEXT NOT NULL,
                client_address TEXT NOT NULL,
                feedback_index BIGINT NOT NULL,
                feedback_hash BYTEA,
                running_digest BYTEA,
                revoke_count BIGINT NOT NULL DEFAULT 0,
                original_score SMALLINT NOT NULL DEFAULT 0,
                atom_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                had_impact BOOLEAN NOT NULL DEFAULT FALSE,
                status TEXT NOT NULL DEFAULT 'PENDING',
                slot BIGINT NOT NULL,
                tx_signature TEXT NOT NULL,
                tx_index INT,
                event_ordinal INT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (asset, client_address, feedback_index, tx_signature)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS validations (
                id BIGSERIAL PRIMARY KEY,
                asset TEXT NOT NULL,
                validator_address TEXT NOT NULL,
                nonce TEXT NOT NULL,
                request_uri TEXT,
                request_hash BYTEA,
                response SMALLINT,
                response_uri TEXT,
                response_hash BYTEA,
                tag TEXT,
                status TEXT NOT NULL DEFAULT 'PENDING',
                slot BIGINT NOT NULL,
                tx_signature TEXT NOT NULL,
                tx_index INT,
                event_ordinal INT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (asset, validator_address, nonce)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                id BIGSERIAL PRIMARY KEY,
                collection_pointer TEXT NOT NULL UNIQUE,
                authority TEXT NOT NULL,
                registry_type TEXT NOT NULL DEFAULT 'BASE',
                status TEXT NOT NULL DEFAULT 'PENDING',
                slot BIGINT NOT NULL,
                tx_signature TEXT NOT NULL,
                tx_index INT,
                event_ordinal INT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata_entries (
                id BIGSERIAL PRIMARY KEY,
                asset TEXT NOT NULL,
                key TEXT NOT NULL,
                value_bytes BYTEA NOT NULL,
                immutable BOOLEAN NOT NULL DEFAULT FALSE,
                status TEXT NOT NULL DEFAULT 'PENDING',
                slot BIGINT NOT NULL,
                tx_signature TEXT NOT NULL,
                tx_index INT,
                event_ordinal INT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (asset, key)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS id_counters (
                scope TEXT PRIMARY KEY,
                next_value BIGINT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hash_chain_checkpoint (
                id BIGSERIAL PRIMARY KEY,
                asset TEXT NOT NULL,
                chain_type TEXT NOT NULL,
                event_count BIGINT NOT NULL,
                digest BYTEA NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (asset, chain_type, event_count)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_digest_cache (
                asset TEXT PRIMARY KEY,
                feedback_digest BYTEA,
                feedback_count BIGINT NOT NULL DEFAULT 0,
                response_digest BYTEA,
                response_count BIGINT NOT NULL DEFAULT 0,
                revoke_digest BYTEA,
                revoke_count BIGINT NOT NULL DEFAULT 0,
                last_verified_at TIMESTAMPTZ,
                last_verified_slot BIGINT,
                needs_gap_fill BOOLEAN NOT NULL DEFAULT FALSE,
                gap_fill_from_slot BIGINT
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS indexer_state (
                id TEXT PRIMARY KEY,
                last_signature TEXT,
                last_slot BIGINT NOT NULL DEFAULT 0,
                source TEXT NOT NULL DEFAULT 'poller',
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        // Canonical-order and verifier scan indexes
        let indexes = [
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_agents_agent_id ON agents(agent_id) WHERE agent_id IS NOT NULL",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_feedbacks_scoped_id ON feedbacks(asset, feedback_id) WHERE feedback_id IS NOT NULL",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_revocations_scoped_id ON revocations(asset, revocation_id) WHERE revocation_id IS NOT NULL",
            "CREATE INDEX IF NOT EXISTS idx_feedbacks_canonical ON feedbacks(slot, tx_signature, tx_index, event_ordinal, id)",
            "CREATE INDEX IF NOT EXISTS idx_responses_canonical ON responses(slot, tx_signature, tx_index, event_ordinal, id)",
            "CREATE INDEX IF NOT EXISTS idx_revocations_canonical ON revocations(slot, tx_signature, tx_index, event_ordinal, id)",
            "CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status) WHERE status = 'PENDING'",
            "CREATE INDEX IF NOT EXISTS idx_feedbacks_status ON feedbacks(status) WHERE status = 'PENDING'",
            "CREATE INDEX IF NOT EXISTS idx_responses_status ON responses(status) WHERE status = 'PENDING'",
            "CREATE INDEX IF NOT EXISTS idx_revocations_status ON revocations(status) WHERE status = 'PENDING'",
            "CREATE INDEX IF NOT EXISTS idx_validations_status ON validations(status) WHERE status = 'PENDING'",
            "CREATE INDEX IF NOT EXISTS idx_metadata_status ON metadata_entries(status) WHERE status = 'PENDING'",
            "CREATE INDEX IF NOT EXISTS idx_feedbacks_asset ON feedbacks(asset)",
            "CREATE INDEX IF NOT EXISTS idx_responses_asset ON responses(asset)",
            "CREATE INDEX IF NOT EXISTS idx_revocations_asset ON revocations(asset)",
        ];
        for index in indexes {
            sqlx::query(index).execute(&self.pool).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO indexer_state (id, last_slot, source)
            VALUES ('main', 0, 'poller')
            ON CONFLICT (id) DO NOTHING
        "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }

    /// Get database pool reference
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ======== Cursor operations ========

    /// Read the global consumer position.
    pub async fn get_cursor(&self) -> Result<CursorRow> {
        let cursor = sqlx::query_as::<_, CursorRow>("SELECT * FROM indexer_state WHERE id = 'main'")
            .fetch_one(&self.pool)
            .await?;
        Ok(cursor)
    }

    // ======== Verifier: pending row selection ========

    /// PENDING agents whose creation slot is at or below the cutoff.
    pub async fn fetch_pending_agents(&self, cutoff_slot: i64, limit: i64) -> Result<Vec<AgentRow>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT * FROM agents
            WHERE status = 'PENDING' AND slot <= $1
            ORDER BY slot, tx_signature
            LIMIT $2
        "#,
        )
        .bind(cutoff_slot)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// PENDING rows of one event table below the cutoff, canonical order.
    pub async fn fetch_pending_event_rows(
        &self,
        table: EventTable,
        cutoff_slot: i64,
        limit: i64,
    ) -> Result<Vec<(i64, String)>> {
        let sql = format!(
            r#"
            SELECT id, asset FROM {}
            WHERE status = 'PENDING' AND slot <= $1
            ORDER BY slot, tx_signature, tx_index NULLS LAST, event_ordinal NULLS LAST, id
            LIMIT $2
        "#,
            table.table()
        );
        let rows = sqlx::query_as::<_, (i64, String)>(&sql)
            .bind(cutoff_slot)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// PENDING validations below the cutoff.
    pub async fn fetch_pending_validations(
        &self,
        cutoff_slot: i64,
        limit: i64,
    ) -> Result<Vec<ValidationRow>> {
        let rows = sqlx::query_as::<_, ValidationRow>(
            r#"
            SELECT * FROM validations
            WHERE status = 'PENDING' AND slot <= $1
            ORDER BY slot, tx_signature
            LIMIT $2
        "#,
        )
        .bind(cutoff_slot)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// PENDING metadata entries below the cutoff.
    pub async fn fetch_pending_metadata(
        &self,
        cutoff_slot: i64,
        limit: i64,
    ) -> Result<Vec<MetadataRow>> {
        let rows = sqlx::query_as::<_, MetadataRow>(
            r#"
            SELECT * FROM metadata_entries
            WHERE status = 'PENDING' AND slot <= $1
            ORDER BY slot, tx_signature
            LIMIT $2
        "#,
        )
        .bind(cutoff_slot)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// PENDING collections below the cutoff.
    pub async fn fetch_pending_collections(
        &self,
        cutoff_slot: i64,
        limit: i64,
    ) -> Result<Vec<CollectionRow>> {
        let rows = sqlx::query_as::<_, CollectionRow>(
            r#"
            SELECT * FROM collections
            WHERE status = 'PENDING' AND slot <= $1
            ORDER BY slot, tx_signature
            LIMIT $2
        "#,
        )
        .bind(cutoff_slot)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ======== Verifier: state transitions ========

    /// Finalize rows by primary key. Status-only, plus the verification stamp.
    pub async fn finalize_rows(&self, table: &str, ids: &[i64], verified_slot: i64) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = if table == "agents" {
            sqlx::query(
                r#"
                UPDATE agents
                SET status = 'FINALIZED', verified_at = NOW(), verified_slot = $2, updated_at = NOW()
                WHERE id = ANY($1) AND status = 'PENDING'
            "#,
            )
            .bind(ids)
            .bind(verified_slot)
            .execute(&self.pool)
            .await?
        } else {
            let sql = format!(
                "UPDATE {table} SET status = 'FINALIZED' WHERE id = ANY($1) AND status = 'PENDING'"
            );
            sqlx::query(&sql).bind(ids).execute(&self.pool).await?
        };
        Ok(result.rows_affected())
    }

    /// Orphan an agent and cascade to its event rows, clearing scoped ids
    /// atomically with the status change.
    pub async fn orphan_agent_cascade(&self, asset: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE agents
            SET status = 'ORPHANED', agent_id = NULL, updated_at = NOW()
            WHERE asset = $1
        "#,
        )
        .bind(asset)
        .execute(&mut *tx)
        .await?;

        for table in [EventTable::Feedback, EventTable::Response, EventTable::Revocation] {
            let sql = format!(
                "UPDATE {} SET status = 'ORPHANED', {} = NULL WHERE asset = $1 AND status != 'ORPHANED'",
                table.table(),
                table.id_column()
            );
            sqlx::query(&sql).bind(asset).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Orphan standalone rows (validations, metadata, collections).
    pub async fn orphan_rows(&self, table: &str, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("UPDATE {table} SET status = 'ORPHANED' WHERE id = ANY($1)");
        let result = sqlx::query(&sql).bind(ids).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// ORPHANED agents, oldest first, for the recovery scan.
    pub async fn fetch_orphaned_agents(&self, limit: i64) -> Result<Vec<AgentRow>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT * FROM agents
            WHERE status = 'ORPHANED'
            ORDER BY slot, tx_signature
            LIMIT $1
        "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Count of rows currently orphaned across the event tables.
    pub async fn count_orphans(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM agents WHERE status = 'ORPHANED')
              + (SELECT COUNT(*) FROM feedbacks WHERE status = 'ORPHANED')
              + (SELECT COUNT(*) FROM responses WHERE status = 'ORPHANED')
              + (SELECT COUNT(*) FROM revocations WHERE status = 'ORPHANED')
        "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ======== Hash chain reads ========

    /// Latest running digest and non-orphaned row count for one chain.
    pub async fn chain_head(&self, table: EventTable, asset: &str) -> Result<(Option<Vec<u8>>, i64)> {
        let sql = format!(
            r#"
            SELECT running_digest FROM {}
            WHERE asset = $1 AND status != 'ORPHANED'
            ORDER BY slot DESC, tx_signature DESC, tx_index DESC NULLS FIRST,
                     event_ordinal DESC NULLS FIRST, id DESC
            LIMIT 1
        "#,
            table.table()
        );
        let digest: Option<(Option<Vec<u8>>,)> = sqlx::query_as(&sql)
            .bind(asset)
            .fetch_optional(&self.pool)
            .await?;

        let count_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE asset = $1 AND status != 'ORPHANED'",
            table.table()
        );
        let (count,): (i64,) = sqlx::query_as(&count_sql)
            .bind(asset)
            .fetch_one(&self.pool)
            .await?;

        Ok((digest.and_then(|(d,)| d), count))
    }

    /// Event hashes of a chain in canonical order, for replay.
    pub async fn chain_event_hashes(
        &self,
        table: EventTable,
        asset: &str,
        after_count: i64,
    ) -> Result<Vec<(i64, Option<Vec<u8>>, Option<Vec<u8>>)>> {
        let hash_column = match table {
            EventTable::Feedback => "feedback_hash",
            EventTable::Response => "response_hash",
            EventTable::Revocation => "feedback_hash",
        };
        let sql = format!(
            r#"
            SELECT id, {hash_column}, running_digest FROM {}
            WHERE asset = $1 AND status != 'ORPHANED'
            ORDER BY slot, tx_signature, tx_index NULLS LAST, event_ordinal NULLS LAST, id
            OFFSET $2
        "#,
            table.table()
        );
        let rows = sqlx::query_as::<_, (i64, Option<Vec<u8>>, Option<Vec<u8>>)>(&sql)
            .bind(asset)
            .bind(after_count)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // ======== Digest cache and checkpoints ========

    /// Upsert the per-agent digest cache after a verification pass.
    pub async fn update_digest_cache(&self, cache: &DigestCacheRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_digest_cache (
                asset, feedback_digest, feedback_count, response_digest, response_count,
                revoke_digest, revoke_count, last_verified_at, last_verified_slot,
                needs_gap_fill, gap_fill_from_slot
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (asset) DO UPDATE SET
                feedback_digest = EXCLUDED.feedback_digest,
                feedback_count = EXCLUDED.feedback_count,
                response_digest = EXCLUDED.response_digest,
                response_count = EXCLUDED.response_count,
                revoke_digest = EXCLUDED.revoke_digest,
                revoke_count = EXCLUDED.revoke_count,
                last_verified_at = EXCLUDED.last_verified_at,
                last_verified_slot = EXCLUDED.last_verified_slot,
                needs_gap_fill = EXCLUDED.needs_gap_fill,
                gap_fill_from_slot = EXCLUDED.gap_fill_from_slot
        "#,
        )
        .bind(&cache.asset)
        .bind(&cache.feedback_digest)
        .bind(cache.feedback_count)
        .bind(&cache.response_digest)
        .bind(cache.response_count)
        .bind(&cache.revoke_digest)
        .bind(cache.revoke_count)
        .bind(cache.last_verified_at.unwrap_or_else(Utc::now))
        .bind(cache.last_verified_slot)
        .bind(cache.needs_gap_fill)
        .bind(cache.gap_fill_from_slot)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a hash-chain checkpoint. Idempotent per (asset, chain, count).
    pub async fn insert_checkpoint(
        &self,
        asset: &str,
        chain_type: ChainType,
        event_count: i64,
        digest: &[u8],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO hash_chain_checkpoint (asset, chain_type, event_count, digest)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (asset, chain_type, event_count) DO NOTHING
        "#,
        )
        .bind(asset)
        .bind(chain_type.as_str())
        .bind(event_count)
        .bind(digest)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Latest checkpoint with `event_count <= target_count`.
    pub async fn latest_checkpoint(
        &self,
        asset: &str,
        chain_type: ChainType,
        target_count: i64,
    ) -> Result<Option<CheckpointRow>> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT * FROM hash_chain_checkpoint
            WHERE asset = $1 AND chain_type = $2 AND event_count <= $3
            ORDER BY event_count DESC
            LIMIT 1
        "#,
        )
        .bind(asset)
        .bind(chain_type.as_str())
        .bind(target_count)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ======== Recovery ========

    /// Return an orphaned agent to PENDING for re-verification.
    pub async fn mark_agent_pending(&self, asset: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agents SET status = 'PENDING', updated_at = NOW()
            WHERE asset = $1 AND status = 'ORPHANED'
        "#,
        )
        .bind(asset)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Orphaned event rows of an asset in canonical on-chain order, for
    /// recovery id reassignment.
    pub async fn fetch_orphaned_event_rows(
        &self,
        table: EventTable,
        asset: &str,
    ) -> Result<Vec<i64>> {
        // Responses recover in (response_count, canonical key) order so id
        // assignment stays replay-deterministic.
        let order = match table {
            EventTable::Response => {
                "response_count, slot, tx_signature, tx_index NULLS LAST, event_ordinal NULLS LAST, id"
            }
            _ => "slot, tx_signature, tx_index NULLS LAST, event_ordinal NULLS LAST, id",
        };
        let sql = format!(
            "SELECT id FROM {} WHERE asset = $1 AND status = 'ORPHANED' ORDER BY {order}",
            table.table()
        );
        let rows = sqlx::query_as::<_, (i64,)>(&sql)
            .bind(asset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Flip one recovered event row back to PENDING (id still NULL until it
    /// re-finalizes through the allocator).
    pub async fn mark_event_row_pending(&self, table: EventTable, id: i64) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET status = 'PENDING' WHERE id = $1 AND status = 'ORPHANED'",
            table.table()
        );
        sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Fetch an agent by asset.
    pub async fn get_agent(&self, asset: &str) -> Result<Option<AgentRow>> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE asset = $1")
            .bind(asset)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Agent status by asset, for cascade checks.
    pub async fn agent_status(&self, asset: &str) -> Result<Option<RowStatus>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT status FROM agents WHERE asset = $1")
            .bind(asset)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(s,)| RowStatus::parse(&s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_table_names() {
        assert_eq!(EventTable::Feedback.table(), "feedbacks");
        assert_eq!(EventTable::Feedback.id_column(), "feedback_id");
        assert_eq!(EventTable::Response.chain_type(), ChainType::Response);
        assert_eq!(EventTable::Revocation.chain_type(), ChainType::Revoke);
    }
}
