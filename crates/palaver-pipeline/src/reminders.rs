// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic booking sweep.
//!
//! Each pass emits one `reminder_pending` notification per confirmed booking
//! whose slot starts within the horizon, then flags the booking so later
//! passes skip it. Bookings still `confirmed` once their slot is more than
//! the grace period in the past are moved to `no_show` with a `no_show`
//! notification. Slots are compared as UTC wall-clock strings.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use palaver_core::{PalaverError, StorageAdapter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::notifier::{BookingRef, NotificationPayload, Notifier};

const SLOT_FORMAT: &str = "%Y-%m-%d %H:%M";

pub struct ReminderSweep {
    storage: Arc<dyn StorageAdapter>,
    notifier: Notifier,
    horizon: chrono::Duration,
    no_show_grace: chrono::Duration,
}

impl ReminderSweep {
    pub fn new(storage: Arc<dyn StorageAdapter>, notifier: Notifier, horizon_hours: u32) -> Self {
        Self {
            storage,
            notifier,
            horizon: chrono::Duration::hours(i64::from(horizon_hours)),
            no_show_grace: chrono::Duration::minutes(60),
        }
    }

    pub fn with_no_show_grace(mut self, minutes: u32) -> Self {
        self.no_show_grace = chrono::Duration::minutes(i64::from(minutes));
        self
    }

    /// Emit reminders for bookings starting in `[now, now + horizon)`.
    /// Returns how many reminders were emitted.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize, PalaverError> {
        let from = now.format(SLOT_FORMAT).to_string();
        let until = (now + self.horizon).format(SLOT_FORMAT).to_string();
        let due = self.storage.due_reminders(&from, &until).await?;

        let mut emitted = 0;
        for booking in &due {
            let payload = NotificationPayload::ReminderPending(BookingRef::from(booking));
            // Left unflagged on failure so the next pass retries it.
            if self.notifier.emit(&booking.tenant_id, payload).await.is_none() {
                continue;
            }
            self.storage.mark_reminder_sent(&booking.id).await?;
            emitted += 1;
        }
        debug!(due = due.len(), emitted, "reminder sweep finished");
        Ok(emitted)
    }

    /// Move bookings whose slot started before `now - grace` and are still
    /// confirmed to `no_show`. Returns how many were flagged.
    pub async fn flag_no_shows(&self, now: DateTime<Utc>) -> Result<usize, PalaverError> {
        let before = (now - self.no_show_grace).format(SLOT_FORMAT).to_string();
        let lapsed = self.storage.lapsed_bookings(&before).await?;

        let mut flagged = 0;
        for booking in &lapsed {
            // Someone else moved it out of `confirmed` in the meantime.
            if !self.storage.mark_no_show(&booking.id).await? {
                continue;
            }
            self.notifier
                .emit(
                    &booking.tenant_id,
                    NotificationPayload::NoShow(BookingRef::from(booking)),
                )
                .await;
            flagged += 1;
        }
        debug!(lapsed = lapsed.len(), flagged, "no-show sweep finished");
        Ok(flagged)
    }

    /// Run the sweep every `interval` until `cancel` fires.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    match self.run_once(now).await {
                        Ok(0) => {}
                        Ok(emitted) => info!(emitted, "booking reminders emitted"),
                        Err(e) => warn!(error = %e, "reminder sweep failed (non-fatal)"),
                    }
                    match self.flag_no_shows(now).await {
                        Ok(0) => {}
                        Ok(flagged) => info!(flagged, "no-show bookings flagged"),
                        Err(e) => warn!(error = %e, "no-show sweep failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("reminder sweep shutting down");
                    break;
                }
            }
        }
    }
}
