// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lifecycle queries and the conversation audit trail.
//!
//! A customer has at most one open (active or escalated) conversation per
//! tenant, enforced by a partial unique index. Every mutation records the
//! acting party in `conversation_audit`.

use palaver_core::{
    Actor, AgentId, Conversation, ConversationId, ConversationStatus, ConversationUpdate,
    FlowSnapshot, PalaverError, TenantId, now_timestamp,
};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params, params_from_iter};

use crate::database::{Database, map_tr_err};
use crate::queries::{new_id, parse_column, parse_json};

pub(crate) const CONVERSATION_COLUMNS: &str = "id, tenant_id, customer_phone, customer_name, status, \
     flow_state, assigned_agent_id, assigned_at, lead_score, lead_status, needs_human, \
     last_message_at, created_at, updated_at";

pub(crate) fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let flow_state: Option<String> = row.get(5)?;
    let flow = match flow_state {
        Some(json) => Some(parse_json::<FlowSnapshot>(5, &json)?),
        None => None,
    };
    Ok(Conversation {
        id: ConversationId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        customer_phone: row.get(2)?,
        customer_name: row.get(3)?,
        status: parse_column(4, row.get(4)?)?,
        flow,
        assigned_agent_id: row.get::<_, Option<String>>(6)?.map(AgentId),
        assigned_at: row.get(7)?,
        lead_score: row.get(8)?,
        lead_status: row.get(9)?,
        needs_human: row.get(10)?,
        last_message_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Append an entry to the conversation audit trail.
pub(crate) fn append_audit(
    conn: &rusqlite::Connection,
    conversation_id: &str,
    actor: Actor,
    action: &str,
    detail: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO conversation_audit (conversation_id, actor, action, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![conversation_id, actor.to_string(), action, detail, now_timestamp()],
    )?;
    Ok(())
}

fn select_by_id(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
        params![id],
        conversation_from_row,
    )
    .optional()
}

/// Return the customer's open conversation, else reactivate their most
/// recently resolved one, else create a new one. Archived conversations are
/// never reused.
pub async fn upsert_conversation(
    db: &Database,
    tenant_id: &TenantId,
    customer_phone: &str,
    customer_name: Option<&str>,
    actor: Actor,
) -> Result<Conversation, PalaverError> {
    let tenant_id = tenant_id.as_str().to_string();
    let phone = customer_phone.to_string();
    let name = customer_name.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = now_timestamp();

            let open_id: Option<String> = tx
                .query_row(
                    "SELECT id FROM conversations
                     WHERE tenant_id = ?1 AND customer_phone = ?2
                       AND status IN ('active', 'escalated')",
                    params![tenant_id, phone],
                    |row| row.get(0),
                )
                .optional()?;

            let id = match open_id {
                Some(id) => {
                    if name.is_some() {
                        tx.execute(
                            "UPDATE conversations SET customer_name = ?1
                             WHERE id = ?2 AND customer_name IS NULL",
                            params![name, id],
                        )?;
                    }
                    id
                }
                None => {
                    let resolved_id: Option<String> = tx
                        .query_row(
                            "SELECT id FROM conversations
                             WHERE tenant_id = ?1 AND customer_phone = ?2 AND status = 'resolved'
                             ORDER BY updated_at DESC LIMIT 1",
                            params![tenant_id, phone],
                            |row| row.get(0),
                        )
                        .optional()?;

                    match resolved_id {
                        Some(id) => {
                            tx.execute(
                                "UPDATE conversations
                                 SET status = 'active', needs_human = 0,
                                     customer_name = COALESCE(?1, customer_name),
                                     updated_at = ?2, updated_by = ?3
                                 WHERE id = ?4",
                                params![name, now, actor.to_string(), id],
                            )?;
                            append_audit(&tx, &id, actor, "reactivated", None)?;
                            id
                        }
                        None => {
                            let id = new_id();
                            tx.execute(
                                "INSERT INTO conversations
                                    (id, tenant_id, customer_phone, customer_name, status,
                                     updated_by, created_at, updated_at)
                                 VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6, ?6)",
                                params![id, tenant_id, phone, name, actor.to_string(), now],
                            )?;
                            append_audit(&tx, &id, actor, "created", None)?;
                            id
                        }
                    }
                }
            };

            let conversation = select_by_id(&tx, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok(conversation)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_conversation(
    db: &Database,
    id: &ConversationId,
) -> Result<Option<Conversation>, PalaverError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| select_by_id(conn, &id))
        .await
        .map_err(map_tr_err)
}

/// Apply a partial update to the mutable conversation fields.
pub async fn update_conversation(
    db: &Database,
    id: &ConversationId,
    update: ConversationUpdate,
    actor: Actor,
) -> Result<(), PalaverError> {
    if update.is_empty() {
        return Ok(());
    }

    let mut sets: Vec<&'static str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(status) = update.status {
        sets.push("status = ?");
        values.push(Value::Text(status.to_string()));
    }
    if let Some(flow) = &update.flow {
        sets.push("current_flow = ?");
        sets.push("flow_state = ?");
        match flow {
            Some(snapshot) => {
                let json = serde_json::to_string(snapshot).map_err(PalaverError::storage)?;
                values.push(Value::Text(snapshot.kind.to_string()));
                values.push(Value::Text(json));
            }
            None => {
                values.push(Value::Null);
                values.push(Value::Null);
            }
        }
    }
    if let Some(needs_human) = update.needs_human {
        sets.push("needs_human = ?");
        values.push(Value::Integer(i64::from(needs_human)));
    }
    if let Some(score) = update.lead_score {
        sets.push("lead_score = ?");
        values.push(Value::Integer(score));
    }
    if let Some(lead_status) = &update.lead_status {
        sets.push("lead_status = ?");
        values.push(Value::Text(lead_status.clone()));
    }
    if let Some(at) = &update.last_message_at {
        sets.push("last_message_at = ?");
        values.push(Value::Text(at.clone()));
    }

    sets.push("updated_at = ?");
    values.push(Value::Text(now_timestamp()));
    sets.push("updated_by = ?");
    values.push(Value::Text(actor.to_string()));
    values.push(Value::Text(id.as_str().to_string()));

    let sql = format!("UPDATE conversations SET {} WHERE id = ?", sets.join(", "));
    let detail = update.describe();
    let id = id.as_str().to_string();

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(&sql, params_from_iter(values.iter()))?;
            append_audit(&tx, &id, actor, "updated", Some(&detail))?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// A single audit trail entry, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub actor: Actor,
    pub action: String,
    pub detail: Option<String>,
    pub created_at: String,
}

pub async fn audit_trail(db: &Database, id: &ConversationId) -> Result<Vec<AuditEntry>, PalaverError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT actor, action, detail, created_at FROM conversation_audit
                 WHERE conversation_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok(AuditEntry {
                    actor: parse_column(0, row.get(0)?)?,
                    action: row.get(1)?,
                    detail: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Set a conversation's status directly. Used by dashboard actions and tests.
pub async fn set_status(
    db: &Database,
    id: &ConversationId,
    status: ConversationStatus,
    actor: Actor,
) -> Result<(), PalaverError> {
    update_conversation(
        db,
        id,
        ConversationUpdate {
            status: Some(status),
            ..Default::default()
        },
        actor,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::tenants::upsert_tenant;
    use crate::queries::test_support::{setup_db, tenant};
    use palaver_core::FlowKind;

    async fn seeded() -> (Database, tempfile::TempDir, TenantId) {
        let (db, dir) = setup_db().await;
        upsert_tenant(&db, &tenant("t1", "15550001111")).await.unwrap();
        (db, dir, TenantId::new("t1"))
    }

    #[tokio::test]
    async fn upsert_returns_same_open_conversation() {
        let (db, _dir, tid) = seeded().await;
        let first = upsert_conversation(&db, &tid, "33612345678", Some("Ana"), Actor::Pipeline)
            .await
            .unwrap();
        let second = upsert_conversation(&db, &tid, "33612345678", None, Actor::Pipeline)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.customer_name.as_deref(), Some("Ana"));
        assert_eq!(second.status, ConversationStatus::Active);
    }

    #[tokio::test]
    async fn resolved_conversation_is_reactivated() {
        let (db, _dir, tid) = seeded().await;
        let conv = upsert_conversation(&db, &tid, "33600000001", None, Actor::Pipeline)
            .await
            .unwrap();
        set_status(&db, &conv.id, ConversationStatus::Resolved, Actor::Dashboard)
            .await
            .unwrap();

        let again = upsert_conversation(&db, &tid, "33600000001", None, Actor::Pipeline)
            .await
            .unwrap();
        assert_eq!(again.id, conv.id);
        assert_eq!(again.status, ConversationStatus::Active);

        let trail = audit_trail(&db, &conv.id).await.unwrap();
        let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["created", "updated", "reactivated"]);
        assert_eq!(trail[1].actor, Actor::Dashboard);
    }

    #[tokio::test]
    async fn archived_conversation_is_not_reused() {
        let (db, _dir, tid) = seeded().await;
        let conv = upsert_conversation(&db, &tid, "33600000002", None, Actor::Pipeline)
            .await
            .unwrap();
        set_status(&db, &conv.id, ConversationStatus::Archived, Actor::Dashboard)
            .await
            .unwrap();

        let fresh = upsert_conversation(&db, &tid, "33600000002", None, Actor::Pipeline)
            .await
            .unwrap();
        assert_ne!(fresh.id, conv.id);
    }

    #[tokio::test]
    async fn second_open_conversation_is_rejected_by_index() {
        let (db, _dir, tid) = seeded().await;
        let conv = upsert_conversation(&db, &tid, "33600000003", None, Actor::Pipeline)
            .await
            .unwrap();
        let tid_str = tid.as_str().to_string();
        let result = db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO conversations (id, tenant_id, customer_phone, status, created_at, updated_at)
                     VALUES ('dup', ?1, '33600000003', 'escalated', 'x', 'x')",
                    params![tid_str],
                )
            })
            .await;
        assert!(result.is_err());
        assert!(get_conversation(&db, &conv.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn flow_snapshot_round_trips_and_clears() {
        let (db, _dir, tid) = seeded().await;
        let conv = upsert_conversation(&db, &tid, "33600000004", None, Actor::Pipeline)
            .await
            .unwrap();
        let snapshot = FlowSnapshot {
            kind: FlowKind::Booking,
            state: serde_json::json!({"step": "collecting_date", "service": "Haircut"}),
            retries: 1,
            started_at: now_timestamp(),
            updated_at: now_timestamp(),
        };

        update_conversation(
            &db,
            &conv.id,
            ConversationUpdate {
                flow: Some(Some(snapshot.clone())),
                lead_score: Some(40),
                ..Default::default()
            },
            Actor::Pipeline,
        )
        .await
        .unwrap();
        let stored = get_conversation(&db, &conv.id).await.unwrap().unwrap();
        assert_eq!(stored.flow, Some(snapshot));
        assert_eq!(stored.lead_score, Some(40));

        update_conversation(
            &db,
            &conv.id,
            ConversationUpdate {
                flow: Some(None),
                ..Default::default()
            },
            Actor::Flow,
        )
        .await
        .unwrap();
        let stored = get_conversation(&db, &conv.id).await.unwrap().unwrap();
        assert!(stored.flow.is_none());
        assert_eq!(stored.lead_score, Some(40));
    }
}
