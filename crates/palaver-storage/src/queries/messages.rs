// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message queries. Messages are append-only; only delivery status (and the
//! provider id of an outbound send) changes after insert.

use palaver_core::{
    ConversationId, DeliveryStatus, InsertOutcome, Message, MessageId, NewMessage, PalaverError,
    StatusUpdate, now_timestamp,
};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::queries::{is_unique_violation, new_id, parse_column, parse_optional_column};

/// Append a message. A provider message id that is already stored yields
/// [`InsertOutcome::Duplicate`]; this is the durable idempotency guard.
pub async fn insert_message(db: &Database, msg: NewMessage) -> Result<InsertOutcome, PalaverError> {
    let message = Message {
        id: MessageId(new_id()),
        conversation_id: msg.conversation_id,
        direction: msg.direction,
        content: msg.content,
        provider_message_id: msg.provider_message_id,
        intent: msg.intent,
        confidence: msg.confidence,
        tier: msg.tier,
        status: msg.status,
        created_at: now_timestamp(),
    };

    db.connection()
        .call(move |conn| {
            let result = conn.execute(
                "INSERT INTO messages (id, conversation_id, direction, content, provider_message_id,
                                       intent, confidence, tier, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    message.id.as_str(),
                    message.conversation_id.as_str(),
                    message.direction.to_string(),
                    message.content,
                    message.provider_message_id,
                    message.intent.map(|i| i.to_string()),
                    message.confidence,
                    message.tier.map(|t| t.to_string()),
                    message.status.to_string(),
                    message.created_at,
                ],
            );
            match result {
                Ok(_) => Ok(InsertOutcome::Inserted(message)),
                Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// The `limit` most recent messages of a conversation, oldest first.
pub async fn recent_messages(
    db: &Database,
    conversation_id: &ConversationId,
    limit: usize,
) -> Result<Vec<Message>, PalaverError> {
    let conversation_id = conversation_id.as_str().to_string();
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, direction, content, provider_message_id,
                        intent, confidence, tier, status, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![conversation_id, limit], |row| {
                Ok(Message {
                    id: MessageId(row.get(0)?),
                    conversation_id: ConversationId(row.get(1)?),
                    direction: parse_column(2, row.get(2)?)?,
                    content: row.get(3)?,
                    provider_message_id: row.get(4)?,
                    intent: parse_optional_column(5, row.get(5)?)?,
                    confidence: row.get(6)?,
                    tier: parse_optional_column(7, row.get(7)?)?,
                    status: parse_column(8, row.get(8)?)?,
                    created_at: row.get(9)?,
                })
            })?;
            let mut messages = rows.collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Record the provider id and status of an outbound send.
pub async fn mark_outbound_result(
    db: &Database,
    id: &MessageId,
    provider_message_id: Option<&str>,
    status: DeliveryStatus,
) -> Result<(), PalaverError> {
    let id = id.as_str().to_string();
    let provider_message_id = provider_message_id.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row("SELECT status FROM messages WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            if let Some(current) = current {
                let current: DeliveryStatus = parse_column(0, current)?;
                let next = if current.can_advance_to(status) { status } else { current };
                tx.execute(
                    "UPDATE messages
                     SET status = ?1, provider_message_id = COALESCE(?2, provider_message_id)
                     WHERE id = ?3",
                    params![next.to_string(), provider_message_id, id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a delivery-status callback. Out-of-order callbacks never move a
/// message backwards.
pub async fn update_delivery_status(
    db: &Database,
    provider_message_id: &str,
    status: DeliveryStatus,
) -> Result<StatusUpdate, PalaverError> {
    let provider_message_id = provider_message_id.to_string();
    db.connection()
        .call(move |conn| {
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM messages WHERE provider_message_id = ?1",
                    params![provider_message_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(current) = current else {
                return Ok(StatusUpdate::UnknownMessage);
            };
            let current: DeliveryStatus = parse_column(0, current)?;
            if !current.can_advance_to(status) {
                return Ok(StatusUpdate::Ignored);
            }
            conn.execute(
                "UPDATE messages SET status = ?1 WHERE provider_message_id = ?2",
                params![status.to_string(), provider_message_id],
            )?;
            Ok(StatusUpdate::Applied)
        })
        .await
        .map_err(map_tr_err)
}
