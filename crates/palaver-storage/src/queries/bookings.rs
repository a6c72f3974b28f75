// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Booking and lead queries.
//!
//! A slot holds at most one confirmed booking (partial unique index on
//! `(tenant_id, date, time)`); losing that race is reported as
//! [`BookingOutcome::SlotTaken`], not as an error.

use palaver_core::{
    Booking, BookingOutcome, ConversationId, NewBooking, NewLead, PalaverError, TenantId,
    now_timestamp,
};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::{Database, map_tr_err};
use crate::queries::{is_unique_violation, new_id, parse_column};

const BOOKING_COLUMNS: &str = "id, tenant_id, conversation_id, customer_phone, service, date, time, \
     status, reminder_sent, created_at";

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        tenant_id: TenantId(row.get(1)?),
        conversation_id: row.get::<_, Option<String>>(2)?.map(ConversationId),
        customer_phone: row.get(3)?,
        service: row.get(4)?,
        date: row.get(5)?,
        time: row.get(6)?,
        status: parse_column(7, row.get(7)?)?,
        reminder_sent: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn select_booking(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Booking>> {
    conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        booking_from_row,
    )
    .optional()
}

pub async fn create_booking(db: &Database, booking: NewBooking) -> Result<BookingOutcome, PalaverError> {
    let id = new_id();
    let created_at = now_timestamp();
    db.connection()
        .call(move |conn| {
            let result = conn.execute(
                "INSERT INTO bookings (id, tenant_id, conversation_id, customer_phone, service,
                                       date, time, status, reminder_sent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'confirmed', 0, ?8)",
                params![
                    id,
                    booking.tenant_id.as_str(),
                    booking.conversation_id.as_ref().map(|c| c.as_str().to_string()),
                    booking.customer_phone,
                    booking.service,
                    booking.date,
                    booking.time,
                    created_at,
                ],
            );
            match result {
                Ok(_) => Ok(select_booking(conn, &id)?
                    .map(BookingOutcome::Booked)
                    .unwrap_or(BookingOutcome::NotFound)),
                Err(e) if is_unique_violation(&e) => Ok(BookingOutcome::SlotTaken),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn reschedule_booking(
    db: &Database,
    booking_id: &str,
    date: &str,
    time: &str,
) -> Result<BookingOutcome, PalaverError> {
    let booking_id = booking_id.to_string();
    let date = date.to_string();
    let time = time.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.execute(
                "UPDATE bookings SET date = ?1, time = ?2, reminder_sent = 0
                 WHERE id = ?3 AND status = 'confirmed'",
                params![date, time, booking_id],
            );
            match result {
                Ok(0) => Ok(BookingOutcome::NotFound),
                Ok(_) => Ok(select_booking(conn, &booking_id)?
                    .map(BookingOutcome::Booked)
                    .unwrap_or(BookingOutcome::NotFound)),
                Err(e) if is_unique_violation(&e) => Ok(BookingOutcome::SlotTaken),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn cancel_booking(db: &Database, booking_id: &str) -> Result<bool, PalaverError> {
    let booking_id = booking_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE bookings SET status = 'cancelled' WHERE id = ?1 AND status = 'confirmed'",
                params![booking_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upcoming_booking(
    db: &Database,
    tenant_id: &TenantId,
    customer_phone: &str,
    today: &str,
) -> Result<Option<Booking>, PalaverError> {
    let tenant_id = tenant_id.as_str().to_string();
    let phone = customer_phone.to_string();
    let today = today.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {BOOKING_COLUMNS} FROM bookings
                     WHERE tenant_id = ?1 AND customer_phone = ?2 AND status = 'confirmed'
                       AND date >= ?3
                     ORDER BY date, time LIMIT 1"
                ),
                params![tenant_id, phone, today],
                booking_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Confirmed bookings whose slot (`date time`) falls in `[from, until)` and
/// whose reminder has not gone out.
pub async fn due_reminders(db: &Database, from: &str, until: &str) -> Result<Vec<Booking>, PalaverError> {
    let from = from.to_string();
    let until = until.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 WHERE status = 'confirmed' AND reminder_sent = 0
                   AND (date || ' ' || time) >= ?1 AND (date || ' ' || time) < ?2
                 ORDER BY date, time"
            ))?;
            let rows = stmt.query_map(params![from, until], booking_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_reminder_sent(db: &Database, booking_id: &str) -> Result<(), PalaverError> {
    let booking_id = booking_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE bookings SET reminder_sent = 1 WHERE id = ?1",
                params![booking_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn lapsed_bookings(db: &Database, before: &str) -> Result<Vec<Booking>, PalaverError> {
    let before = before.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 WHERE status = 'confirmed' AND (date || ' ' || time) < ?1
                 ORDER BY date, time"
            ))?;
            let rows = stmt.query_map(params![before], booking_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_no_show(db: &Database, booking_id: &str) -> Result<bool, PalaverError> {
    let booking_id = booking_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE bookings SET status = 'no_show' WHERE id = ?1 AND status = 'confirmed'",
                params![booking_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn insert_lead(db: &Database, lead: NewLead) -> Result<(), PalaverError> {
    let id = new_id();
    let created_at = now_timestamp();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO leads (id, tenant_id, conversation_id, name, email, interest, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    lead.tenant_id.as_str(),
                    lead.conversation_id.as_str(),
                    lead.name,
                    lead.email,
                    lead.interest,
                    created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Number of leads captured for a tenant.
pub async fn count_leads(db: &Database, tenant_id: &TenantId) -> Result<u64, PalaverError> {
    let tenant_id = tenant_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM leads WHERE tenant_id = ?1",
                params![tenant_id],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
        .map_err(map_tr_err)
}
