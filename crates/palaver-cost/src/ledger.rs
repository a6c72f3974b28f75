// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost ledger for persisting AI call records to SQLite.
//!
//! Each classification or reply call is recorded with its tier, model,
//! token counts, and cost in USD, keyed by tenant. The ledger answers daily
//! per-tenant totals for reporting.

use palaver_core::{ConversationId, CostFeature, PalaverError, TenantId, Tier, TokenUsage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single cost record representing one AI call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// Unique record identifier (UUID v4).
    pub id: String,
    pub tenant_id: TenantId,
    pub conversation_id: Option<ConversationId>,
    /// Tier whose model served the call; billing uses this tier's rate.
    pub tier: Tier,
    /// Model that served the call.
    pub model: String,
    pub feature: CostFeature,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    /// ISO 8601 timestamp.
    pub created_at: String,
}

impl CostRecord {
    pub fn new(
        tenant_id: TenantId,
        conversation_id: Option<ConversationId>,
        tier: Tier,
        model: String,
        feature: CostFeature,
        usage: &TokenUsage,
        cost_usd: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            conversation_id,
            tier,
            model,
            feature,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd,
            created_at: palaver_core::now_timestamp(),
        }
    }
}

fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> PalaverError {
    PalaverError::storage(e)
}

/// Persistent cost ledger backed by the `cost_ledger` table.
///
/// Shares the storage crate's single-writer connection handle.
#[derive(Clone)]
pub struct CostLedger {
    conn: tokio_rusqlite::Connection,
}

impl CostLedger {
    pub fn new(conn: tokio_rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub async fn record(&self, record: &CostRecord) -> Result<(), PalaverError> {
        let r = record.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO cost_ledger (id, tenant_id, conversation_id, tier, model, feature,
                                              input_tokens, output_tokens, cost_usd, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        r.id,
                        r.tenant_id.as_str(),
                        r.conversation_id.as_ref().map(|c| c.as_str().to_string()),
                        r.tier.to_string(),
                        r.model,
                        r.feature.to_string(),
                        r.input_tokens,
                        r.output_tokens,
                        r.cost_usd,
                        r.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(
            tenant_id = %record.tenant_id,
            tier = %record.tier,
            model = %record.model,
            feature = %record.feature,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost_usd = record.cost_usd,
            "cost recorded"
        );
        Ok(())
    }

    /// Sum of a tenant's costs on a UTC date (`YYYY-MM-DD`).
    pub async fn daily_total(&self, tenant_id: &TenantId, date: &str) -> Result<f64, PalaverError> {
        let tenant_id = tenant_id.as_str().to_string();
        let date = date.to_string();
        self.conn
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM cost_ledger
                     WHERE tenant_id = ?1 AND created_at >= ?2 AND created_at < date(?2, '+1 day')",
                    rusqlite::params![tenant_id, date],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Sum of a tenant's costs today (UTC).
    pub async fn today_total(&self, tenant_id: &TenantId) -> Result<f64, PalaverError> {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        self.daily_total(tenant_id, &today).await
    }

    /// Sum of costs attributed to one conversation.
    pub async fn conversation_total(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<f64, PalaverError> {
        let conversation_id = conversation_id.as_str().to_string();
        self.conn
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM cost_ledger WHERE conversation_id = ?1",
                    rusqlite::params![conversation_id],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)
    }
}
