// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dashboard notification queries.

use palaver_core::{
    ConversationId, NewNotification, Notification, PalaverError, TenantId, now_timestamp,
};
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::queries::{new_id, parse_column};

pub async fn insert_notification(
    db: &Database,
    notification: NewNotification,
) -> Result<Notification, PalaverError> {
    let stored = Notification {
        id: new_id(),
        tenant_id: notification.tenant_id,
        kind: notification.kind,
        title: notification.title,
        message: notification.message,
        booking_id: notification.booking_id,
        conversation_id: notification.conversation_id,
        is_read: false,
        created_at: now_timestamp(),
    };
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO notifications (id, tenant_id, kind, title, message, booking_id,
                                            conversation_id, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
                params![
                    stored.id,
                    stored.tenant_id.as_str(),
                    stored.kind.to_string(),
                    stored.title,
                    stored.message,
                    stored.booking_id,
                    stored.conversation_id.as_ref().map(|c| c.as_str().to_string()),
                    stored.created_at,
                ],
            )?;
            Ok(stored)
        })
        .await
        .map_err(map_tr_err)
}

/// Notifications for a tenant, newest first.
pub async fn list_notifications(
    db: &Database,
    tenant_id: &TenantId,
) -> Result<Vec<Notification>, PalaverError> {
    let tenant_id = tenant_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, kind, title, message, booking_id, conversation_id,
                        is_read, created_at
                 FROM notifications WHERE tenant_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt.query_map(params![tenant_id], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    tenant_id: TenantId(row.get(1)?),
                    kind: parse_column(2, row.get(2)?)?,
                    title: row.get(3)?,
                    message: row.get(4)?,
                    booking_id: row.get(5)?,
                    conversation_id: row.get::<_, Option<String>>(6)?.map(ConversationId),
                    is_read: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
