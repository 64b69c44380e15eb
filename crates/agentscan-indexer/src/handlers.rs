//! Per-event write handlers
//!
//! Every handler runs inside the buffer's flush transaction. Scoped ids are
//! allocated under the scope's advisory lock, after a duplicate-identity
//! lookup in the same critical section, so replaying an event neither
//! duplicates rows nor burns an id.

use crate::config::{Config, MetadataIndexMode};
use crate::error::Result;
use crate::ids;
use crate::uri_queue::{UriWorkQueue, URI_KEY_PREFIX};
use agentscan_core::events::*;
use agentscan_core::{hashchain, Hash32};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Postgres, Transaction};
use tracing::{debug, warn};

type PgTx<'a> = Transaction<'a, Postgres>;

/// Shared context for event application.
pub struct EventContext<'a> {
    pub config: &'a Config,
    pub uri_queue: &'a UriWorkQueue,
}

impl EventContext<'_> {
    /// Hand URI fetch work to the metadata subsystem, unless it is off.
    fn enqueue_uri(&self, asset: &str, uri: &str) {
        if self.config.metadata_index_mode == MetadataIndexMode::Normal && !uri.is_empty() {
            self.uri_queue.enqueue(asset, uri);
        }
    }
}

fn event_time(event: &DecodedEvent) -> DateTime<Utc> {
    event
        .block_time
        .and_then(|t| Utc.timestamp_opt(t, 0).single())
        .unwrap_or_else(Utc::now)
}

/// Current chain head for one agent chain, locked for update.
struct AgentChainHead {
    digest: Option<Vec<u8>>,
    count: i64,
}

async fn lock_agent_chain(
    tx: &mut PgTx<'_>,
    asset: &str,
    digest_column: &str,
    count_column: &str,
) -> Result<Option<AgentChainHead>> {
    let sql = format!(
        "SELECT {digest_column}, {count_column} FROM agents WHERE asset = $1 FOR UPDATE"
    );
    let row: Option<(Option<Vec<u8>>, i64)> = sqlx::query_as(&sql)
        .bind(asset)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.map(|(digest, count)| AgentChainHead { digest, count }))
}

fn advance(head: &AgentChainHead, event_hash: Option<&Hash32>) -> Hash32 {
    let prev = head
        .digest
        .as_deref()
        .and_then(|d| Hash32::from_slice(d).ok())
        .unwrap_or(hashchain::ZERO_DIGEST);
    hashchain::next_digest(&prev, event_hash.unwrap_or(&Hash32::ZERO))
}

/// Apply one decoded event. Dispatch happens in canonical order from the
/// buffer; this function never reorders anything.
pub async fn apply_event(
    tx: &mut PgTx<'_>,
    ctx: &EventContext<'_>,
    event: &DecodedEvent,
) -> Result<()> {
    match &event.event {
        RegistryEvent::AgentRegistered(e) => agent_registered(tx, ctx, event, e).await,
        RegistryEvent::UriUpdated(e) => uri_updated(tx, ctx, e).await,
        RegistryEvent::WalletUpdated(e) => wallet_updated(tx, e).await,
        RegistryEvent::AtomEnabled(e) => atom_enabled(tx, e).await,
        RegistryEvent::AgentOwnerSynced(e) => agent_owner_synced(tx, e).await,
        RegistryEvent::MetadataSet(e) => metadata_set(tx, event, e).await,
        RegistryEvent::MetadataDeleted(e) => metadata_deleted(tx, e).await,
        RegistryEvent::NewFeedback(e) => new_feedback(tx, event, e).await,
        RegistryEvent::FeedbackRevoked(e) => feedback_revoked(tx, event, e).await,
        RegistryEvent::ResponseAppended(e) => response_appended(tx, event, e).await,
        RegistryEvent::ValidationRequested(e) => {
            if ctx.config.validation_index_enabled {
                validation_requested(tx, event, e).await
            } else {
                Ok(())
            }
        }
        RegistryEvent::ValidationResponded(e) => {
            if ctx.config.validation_index_enabled {
                validation_responded(tx, event, e).await
            } else {
                Ok(())
            }
        }
        RegistryEvent::RegistryInitialized(e) => registry_initialized(tx, event, e).await,
    }
}

async fn agent_registered(
    tx: &mut PgTx<'_>,
    ctx: &EventContext<'_>,
    meta: &DecodedEvent,
    e: &AgentRegistered,
) -> Result<()> {
    let asset = e.asset.to_base58();
    let scope = ids::agent_scope();
    ids::lock_scope(tx, &scope).await?;

    // Replay guard: reuse an already-assigned id.
    let existing: Option<(Option<i64>,)> =
        sqlx::query_as("SELECT agent_id FROM agents WHERE asset = $1 FOR UPDATE")
            .bind(&asset)
            .fetch_optional(&mut **tx)
            .await?;

    let agent_id = match existing {
        Some((Some(id),)) => id,
        _ => ids::allocate(tx, &scope).await?,
    };

    sqlx::query(
        r#"
        INSERT INTO agents (
            agent_id, asset, owner, collection_pointer, creator, parent_asset,
            agent_uri, atom_enabled, status, slot, tx_signature, tx_index, event_ordinal
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', $9, $10, $11, $12)
        ON CONFLICT (asset) DO UPDATE SET
            agent_id = COALESCE(agents.agent_id, EXCLUDED.agent_id),
            owner = EXCLUDED.owner,
            collection_pointer = EXCLUDED.collection_pointer,
            creator = EXCLUDED.creator,
            parent_asset = EXCLUDED.parent_asset,
            agent_uri = EXCLUDED.agent_uri,
            atom_enabled = EXCLUDED.atom_enabled,
            status = CASE WHEN agents.status = 'ORPHANED' THEN 'PENDING'
                          ELSE agents.status END,
            updated_at = NOW()
    "#,
    )
    .bind(agent_id)
    .bind(&asset)
    .bind(e.owner.to_base58())
    .bind(e.collection.to_base58())
    .bind(e.creator.to_base58())
    .bind(e.parent_asset.map(|a| a.to_base58()))
    .bind(if e.agent_uri.is_empty() { None } else { Some(e.agent_uri.clone()) })
    .bind(e.atom_enabled)
    .bind(meta.slot as i64)
    .bind(&meta.signature)
    .bind(meta.tx_index)
    .bind(meta.event_ordinal)
    .execute(&mut **tx)
    .await?;

    ctx.enqueue_uri(&asset, &e.agent_uri);
    Ok(())
}

async fn uri_updated(tx: &mut PgTx<'_>, ctx: &EventContext<'_>, e: &UriUpdated) -> Result<()> {
    let asset = e.asset.to_base58();
    sqlx::query("UPDATE agents SET agent_uri = $2, updated_at = NOW() WHERE asset = $1")
        .bind(&asset)
        .bind(if e.agent_uri.is_empty() { None } else { Some(e.agent_uri.clone()) })
        .execute(&mut **tx)
        .await?;

    ctx.enqueue_uri(&asset, &e.agent_uri);
    Ok(())
}

async fn wallet_updated(tx: &mut PgTx<'_>, e: &WalletUpdated) -> Result<()> {
    // The zero address clears the wallet.
    let wallet = (!e.wallet.is_zero()).then(|| e.wallet.to_base58());
    sqlx::query("UPDATE agents SET wallet = $2, updated_at = NOW() WHERE asset = $1")
        .bind(e.asset.to_base58())
        .bind(wallet)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn atom_enabled(tx: &mut PgTx<'_>, e: &AtomEnabled) -> Result<()> {
    sqlx::query("UPDATE agents SET atom_enabled = $2, updated_at = NOW() WHERE asset = $1")
        .bind(e.asset.to_base58())
        .bind(e.enabled)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn agent_owner_synced(tx: &mut PgTx<'_>, e: &AgentOwnerSynced) -> Result<()> {
    sqlx::query("UPDATE agents SET owner = $2, updated_at = NOW() WHERE asset = $1")
        .bind(e.asset.to_base58())
        .bind(e.owner.to_base58())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn metadata_set(tx: &mut PgTx<'_>, meta: &DecodedEvent, e: &MetadataSet) -> Result<()> {
    // Reserved keys belong to the URI fetcher; chain events never touch them.
    if e.key.starts_with(URI_KEY_PREFIX) {
        debug!("Ignoring reserved metadata key {} for {}", e.key, e.asset);
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO metadata_entries
            (asset, key, value_bytes, immutable, status, slot, tx_signature, tx_index, event_ordinal)
        VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, $7, $8)
        ON CONFLICT (asset, key) DO UPDATE SET
            value_bytes = EXCLUDED.value_bytes,
            immutable = EXCLUDED.immutable,
            status = 'PENDING',
            slot = EXCLUDED.slot,
            tx_signature = EXCLUDED.tx_signature,
            tx_index = EXCLUDED.tx_index,
            event_ordinal = EXCLUDED.event_ordinal,
            updated_at = NOW()
        WHERE NOT metadata_entries.immutable
    "#,
    )
    .bind(e.asset.to_base58())
    .bind(&e.key)
    .bind(&e.value)
    .bind(e.immutable)
    .bind(meta.slot as i64)
    .bind(&meta.signature)
    .bind(meta.tx_index)
    .bind(meta.event_ordinal)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn metadata_deleted(tx: &mut PgTx<'_>, e: &MetadataDeleted) -> Result<()> {
    sqlx::query("DELETE FROM metadata_entries WHERE asset = $1 AND key = $2")
        .bind(e.asset.to_base58())
        .bind(&e.key)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn update_atom_metrics(
    tx: &mut PgTx<'_>,
    asset: &str,
    atom: &AtomMetrics,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE agents SET
            trust_tier = $2, quality_score = $3, confidence = $4,
            risk_score = $5, diversity_ratio = $6, updated_at = NOW()
        WHERE asset = $1
    "#,
    )
    .bind(asset)
    .bind(atom.trust_tier as i16)
    .bind(atom.quality_score as i32)
    .bind(atom.confidence as i32)
    .bind(atom.risk_score as i16)
    .bind(atom.diversity_ratio as i16)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn new_feedback(tx: &mut PgTx<'_>, meta: &DecodedEvent, e: &NewFeedback) -> Result<()> {
    let asset = e.asset.to_base58();
    let client = e.client_address.to_base58();
    let scope = ids::feedback_scope(&asset);
    ids::lock_scope(tx, &scope).await?;

    // Replay guard on the canonical identity.
    let existing: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM feedbacks WHERE asset = $1 AND client_address = $2 AND feedback_index = $3",
    )
    .bind(&asset)
    .bind(&client)
    .bind(e.feedback_index as i64)
    .fetch_optional(&mut **tx)
    .await?;
    if existing.is_some() {
        debug!("Duplicate feedback ({asset}, {client}, {}); no-op", e.feedback_index);
        return Ok(());
    }

    let seal = e.seal_hash.non_zero();
    let Some(head) = lock_agent_chain(tx, &asset, "feedback_digest", "feedback_count").await?
    else {
        // Feedback ahead of its agent: park it orphaned; recovery picks it
        // up once the agent row exists on-chain and in the view.
        warn!("Feedback for unknown agent {asset}; inserting ORPHANED");
        sqlx::query(
            r#"
            INSERT INTO feedbacks (
                feedback_id, asset, client_address, feedback_index, value, value_decimals,
                score, tag1, tag2, endpoint, feedback_uri, feedback_hash, running_digest,
                status, slot, tx_signature, tx_index, event_ordinal
            )
            VALUES (NULL, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NULL,
                    'ORPHANED', $12, $13, $14, $15)
            ON CONFLICT (asset, client_address, feedback_index) DO NOTHING
        "#,
        )
        .bind(&asset)
        .bind(&client)
        .bind(e.feedback_index as i64)
        .bind(e.value as i64)
        .bind(e.value_decimals as i16)
        .bind(e.score as i16)
        .bind(&e.tag1)
        .bind(&e.tag2)
        .bind(&e.endpoint)
        .bind(&e.feedback_uri)
        .bind(seal.map(|h| h.0.to_vec()))
        .bind(meta.slot as i64)
        .bind(&meta.signature)
        .bind(meta.tx_index)
        .bind(meta.event_ordinal)
        .execute(&mut **tx)
        .await?;
        return Ok(());
    };

    let feedback_id = ids::allocate(tx, &scope).await?;
    let running_digest = advance(&head, seal.as_ref());

    sqlx::query(
        r#"
        INSERT INTO feedbacks (
            feedback_id, asset, client_address, feedback_index, value, value_decimals,
            score, tag1, tag2, endpoint, feedback_uri, feedback_hash, running_digest,
            status, slot, tx_signature, tx_index, event_ordinal
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                'PENDING', $14, $15, $16, $17)
    "#,
    )
    .bind(feedback_id)
    .bind(&asset)
    .bind(&client)
    .bind(e.feedback_index as i64)
    .bind(e.value as i64)
    .bind(e.value_decimals as i16)
    .bind(e.score as i16)
    .bind(&e.tag1)
    .bind(&e.tag2)
    .bind(&e.endpoint)
    .bind(&e.feedback_uri)
    .bind(seal.map(|h| h.0.to_vec()))
    .bind(running_digest.0.to_vec())
    .bind(meta.slot as i64)
    .bind(&meta.signature)
    .bind(meta.tx_index)
    .bind(meta.event_ordinal)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE agents SET feedback_digest = $2, feedback_count = $3, updated_at = NOW()
        WHERE asset = $1
    "#,
    )
    .bind(&asset)
    .bind(running_digest.0.to_vec())
    .bind(head.count + 1)
    .execute(&mut **tx)
    .await?;

    if let Some(atom) = &e.atom {
        update_atom_metrics(tx, &asset, atom).await?;
    }
    Ok(())
}

async fn feedback_revoked(
    tx: &mut PgTx<'_>,
    meta: &DecodedEvent,
    e: &FeedbackRevoked,
) -> Result<()> {
    let asset = e.asset.to_base58();
    let client = e.client_address.to_base58();
    let scope = ids::revocation_scope(&asset);
    ids::lock_scope(tx, &scope).await?;

    // Replay guard.
    let existing: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM revocations
        WHERE asset = $1 AND client_address = $2 AND feedback_index = $3 AND tx_signature = $4
    "#,
    )
    .bind(&asset)
    .bind(&client)
    .bind(e.feedback_index as i64)
    .bind(&meta.signature)
    .fetch_optional(&mut **tx)
    .await?;
    if existing.is_some() {
        return Ok(());
    }

    let seal = e.seal_hash.non_zero();
    let feedback: Option<(i64, Option<Vec<u8>>)> = sqlx::query_as(
        r#"
        SELECT id, feedback_hash FROM feedbacks
        WHERE asset = $1 AND client_address = $2 AND feedback_index = $3
        FOR UPDATE
    "#,
    )
    .bind(&asset)
    .bind(&client)
    .bind(e.feedback_index as i64)
    .fetch_optional(&mut **tx)
    .await?;

    // A stored NULL hash matches an all-zero seal (both mean "unsealed").
    let seal_matches = match &feedback {
        Some((_, stored)) => stored.as_deref() == seal.as_ref().map(|h| h.0.as_slice()),
        None => false,
    };

    if let (Some((feedback_row_id, _)), true) = (&feedback, seal_matches) {
        // The owning agent row must exist before the revoke chain can
        // advance; otherwise park the revocation for the recovery scan.
        let Some(head) = lock_agent_chain(tx, &asset, "revoke_digest", "revoke_count").await?
        else {
            warn!("Revocation for unknown agent {asset}; inserting ORPHANED");
            insert_orphaned_revocation(tx, meta, e, &asset, &client, seal).await?;
            return Ok(());
        };

        let revoked_at = event_time(meta);
        sqlx::query(
            "UPDATE feedbacks SET is_revoked = TRUE, revoked_at = $2 WHERE id = $1",
        )
        .bind(feedback_row_id)
        .bind(revoked_at)
        .execute(&mut **tx)
        .await?;

        let revocation_id = ids::allocate(tx, &scope).await?;
        let running_digest = advance(&head, seal.as_ref());

        sqlx::query(
            r#"
            INSERT INTO revocations (
                revocation_id, asset, client_address, feedback_index, feedback_hash,
                running_digest, revoke_count, original_score, atom_enabled, had_impact,
                status, slot, tx_signature, tx_index, event_ordinal
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    'PENDING', $11, $12, $13, $14)
        "#,
        )
        .bind(revocation_id)
        .bind(&asset)
        .bind(&client)
        .bind(e.feedback_index as i64)
        .bind(seal.map(|h| h.0.to_vec()))
        .bind(running_digest.0.to_vec())
        .bind(head.count + 1)
        .bind(e.original_score as i16)
        .bind(e.atom_enabled)
        .bind(e.had_impact)
        .bind(meta.slot as i64)
        .bind(&meta.signature)
        .bind(meta.tx_index)
        .bind(meta.event_ordinal)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE agents SET revoke_digest = $2, revoke_count = $3, updated_at = NOW()
            WHERE asset = $1
        "#,
        )
        .bind(&asset)
        .bind(running_digest.0.to_vec())
        .bind(head.count + 1)
        .execute(&mut **tx)
        .await?;

        if e.had_impact {
            if let Some(atom) = &e.atom {
                update_atom_metrics(tx, &asset, atom).await?;
            }
        }
    } else {
        // Seal mismatch or unknown feedback: record the revocation orphaned
        // without touching the feedback or the chain.
        if feedback.is_some() {
            warn!(
                "Revocation seal mismatch for ({asset}, {client}, {}); recording ORPHANED",
                e.feedback_index
            );
        } else {
            warn!(
                "Revocation for unknown feedback ({asset}, {client}, {}); recording ORPHANED",
                e.feedback_index
            );
        }
        insert_orphaned_revocation(tx, meta, e, &asset, &client, seal).await?;
    }
    Ok(())
}

/// Park a revocation ORPHANED with a NULL scoped id, touching neither the
/// feedback nor the revoke chain. Recovery re-admits it later.
async fn insert_orphaned_revocation(
    tx: &mut PgTx<'_>,
    meta: &DecodedEvent,
    e: &FeedbackRevoked,
    asset: &str,
    client: &str,
    seal: Option<Hash32>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO revocations (
            revocation_id, asset, client_address, feedback_index, feedback_hash,
            running_digest, revoke_count, original_score, atom_enabled, had_impact,
            status, slot, tx_signature, tx_index, event_ordinal
        )
        VALUES (NULL, $1, $2, $3, $4, NULL, 0, $5, $6, $7,
                'ORPHANED', $8, $9, $10, $11)
        ON CONFLICT (asset, client_address, feedback_index, tx_signature) DO NOTHING
    "#,
    )
    .bind(asset)
    .bind(client)
    .bind(e.feedback_index as i64)
    .bind(seal.map(|h| h.0.to_vec()))
    .bind(e.original_score as i16)
    .bind(e.atom_enabled)
    .bind(e.had_impact)
    .bind(meta.slot as i64)
    .bind(&meta.signature)
    .bind(meta.tx_index)
    .bind(meta.event_ordinal)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn response_appended(
    tx: &mut PgTx<'_>,
    meta: &DecodedEvent,
    e: &ResponseAppended,
) -> Result<()> {
    let asset = e.asset.to_base58();
    let client = e.client_address.to_base58();
    let responder = e.responder.to_base58();
    let scope = ids::response_scope(&asset, &client, e.feedback_index as i64);
    ids::lock_scope(tx, &scope).await?;

    // Replay guard.
    let existing: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM responses
        WHERE asset = $1 AND client_address = $2 AND feedback_index = $3
          AND responder = $4 AND tx_signature = $5
    "#,
    )
    .bind(&asset)
    .bind(&client)
    .bind(e.feedback_index as i64)
    .bind(&responder)
    .bind(&meta.signature)
    .fetch_optional(&mut **tx)
    .await?;
    if existing.is_some() {
        return Ok(());
    }

    let seal = e.seal_hash.non_zero();
    let feedback: Option<(i64, Option<Vec<u8>>)> = sqlx::query_as(
        r#"
        SELECT id, feedback_hash FROM feedbacks
        WHERE asset = $1 AND client_address = $2 AND feedback_index = $3
    "#,
    )
    .bind(&asset)
    .bind(&client)
    .bind(e.feedback_index as i64)
    .fetch_optional(&mut **tx)
    .await?;

    let seal_matches = match &feedback {
        Some((_, stored)) => stored.as_deref() == seal.as_ref().map(|h| h.0.as_slice()),
        None => false,
    };

    let response_hash = e.response_hash.non_zero();

    if seal_matches {
        // Same guard as revocations: no agent row, no chain advance.
        let Some(head) = lock_agent_chain(tx, &asset, "response_digest", "response_count").await?
        else {
            warn!("Response for unknown agent {asset}; inserting ORPHANED");
            insert_orphaned_response(tx, meta, e, &asset, &client, &responder, response_hash)
                .await?;
            return Ok(());
        };

        let response_id = ids::allocate(tx, &scope).await?;
        let running_digest = advance(&head, response_hash.as_ref());

        sqlx::query(
            r#"
            INSERT INTO responses (
                response_id, asset, client_address, feedback_index, responder,
                response_uri, response_hash, running_digest, response_count,
                status, slot, tx_signature, tx_index, event_ordinal
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                    'PENDING', $10, $11, $12, $13)
        "#,
        )
        .bind(response_id)
        .bind(&asset)
        .bind(&client)
        .bind(e.feedback_index as i64)
        .bind(&responder)
        .bind(&e.response_uri)
        .bind(response_hash.map(|h| h.0.to_vec()))
        .bind(running_digest.0.to_vec())
        .bind(head.count + 1)
        .bind(meta.slot as i64)
        .bind(&meta.signature)
        .bind(meta.tx_index)
        .bind(meta.event_ordinal)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE agents SET response_digest = $2, response_count = $3, updated_at = NOW()
            WHERE asset = $1
        "#,
        )
        .bind(&asset)
        .bind(running_digest.0.to_vec())
        .bind(head.count + 1)
        .execute(&mut **tx)
        .await?;
    } else {
        warn!(
            "Response without matching feedback ({asset}, {client}, {}); recording ORPHANED",
            e.feedback_index
        );
        insert_orphaned_response(tx, meta, e, &asset, &client, &responder, response_hash).await?;
    }
    Ok(())
}

/// Park a response ORPHANED with a NULL scoped id, leaving the response
/// chain untouched. Recovery re-admits it later.
async fn insert_orphaned_response(
    tx: &mut PgTx<'_>,
    meta: &DecodedEvent,
    e: &ResponseAppended,
    asset: &str,
    client: &str,
    responder: &str,
    response_hash: Option<Hash32>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO responses (
            response_id, asset, client_address, feedback_index, responder,
            response_uri, response_hash, running_digest, response_count,
            status, slot, tx_signature, tx_index, event_ordinal
        )
        VALUES (NULL, $1, $2, $3, $4, $5, $6, NULL, 0,
                'ORPHANED', $7, $8, $9, $10)
        ON CONFLICT (asset, client_address, feedback_index, responder, tx_signature)
            DO NOTHING
    "#,
    )
    .bind(asset)
    .bind(client)
    .bind(e.feedback_index as i64)
    .bind(responder)
    .bind(&e.response_uri)
    .bind(response_hash.map(|h| h.0.to_vec()))
    .bind(meta.slot as i64)
    .bind(&meta.signature)
    .bind(meta.tx_index)
    .bind(meta.event_ordinal)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn validation_requested(
    tx: &mut PgTx<'_>,
    meta: &DecodedEvent,
    e: &ValidationRequested,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO validations (
            asset, validator_address, nonce, request_uri, request_hash,
            status, slot, tx_signature, tx_index, event_ordinal
        )
        VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $7, $8, $9)
        ON CONFLICT (asset, validator_address, nonce) DO UPDATE SET
            request_uri = EXCLUDED.request_uri,
            request_hash = EXCLUDED.request_hash,
            updated_at = NOW()
    "#,
    )
    .bind(e.asset.to_base58())
    .bind(e.validator_address.to_base58())
    .bind(e.nonce.to_string())
    .bind(&e.request_uri)
    .bind(e.request_hash.non_zero().map(|h| h.0.to_vec()))
    .bind(meta.slot as i64)
    .bind(&meta.signature)
    .bind(meta.tx_index)
    .bind(meta.event_ordinal)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn validation_responded(
    tx: &mut PgTx<'_>,
    meta: &DecodedEvent,
    e: &ValidationResponded,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO validations (
            asset, validator_address, nonce, response, response_uri, response_hash, tag,
            status, slot, tx_signature, tx_index, event_ordinal
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'PENDING', $8, $9, $10, $11)
        ON CONFLICT (asset, validator_address, nonce) DO UPDATE SET
            response = EXCLUDED.response,
            response_uri = EXCLUDED.response_uri,
            response_hash = EXCLUDED.response_hash,
            tag = EXCLUDED.tag,
            status = 'PENDING',
            updated_at = NOW()
    "#,
    )
    .bind(e.asset.to_base58())
    .bind(e.validator_address.to_base58())
    .bind(e.nonce.to_string())
    .bind(e.response as i16)
    .bind(&e.response_uri)
    .bind(e.response_hash.and_then(|h| h.non_zero()).map(|h| h.0.to_vec()))
    .bind(&e.tag)
    .bind(meta.slot as i64)
    .bind(&meta.signature)
    .bind(meta.tx_index)
    .bind(meta.event_ordinal)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn registry_initialized(
    tx: &mut PgTx<'_>,
    meta: &DecodedEvent,
    e: &RegistryInitialized,
) -> Result<()> {
    let registry_type = if e.registry_type == 0 { "BASE" } else { "USER" };
    sqlx::query(
        r#"
        INSERT INTO collections (
            collection_pointer, authority, registry_type,
            status, slot, tx_signature, tx_index, event_ordinal
        )
        VALUES ($1, $2, $3, 'PENDING', $4, $5, $6, $7)
        ON CONFLICT (collection_pointer) DO UPDATE SET
            authority = EXCLUDED.authority,
            registry_type = EXCLUDED.registry_type,
            updated_at = NOW()
    "#,
    )
    .bind(e.collection.to_base58())
    .bind(e.authority.to_base58())
    .bind(registry_type)
    .bind(meta.slot as i64)
    .bind(&meta.signature)
    .bind(meta.tx_index)
    .bind(meta.event_ordinal)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_time_prefers_block_time() {
        let event = DecodedEvent {
            signature: "sig".to_string(),
            slot: 1,
            tx_index: None,
            event_ordinal: 0,
            block_time: Some(1_700_000_000),
            event: RegistryEvent::MetadataDeleted(MetadataDeleted {
                asset: agentscan_core::Address([1; 32]),
                key: "k".to_string(),
            }),
        };
        assert_eq!(event_time(&event).timestamp(), 1_700_000_000);
    }
}
