// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dashboard notifications.
//!
//! Emitting a notification never fails the caller: a storage error is
//! logged and the turn carries on.

use std::sync::Arc;

use palaver_core::{
    Booking, ConversationId, NewNotification, Notification, NotificationKind, StorageAdapter,
    TenantId,
};
use palaver_prometheus::record_notification;
use tracing::{debug, warn};

/// The booking fields a notification needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRef {
    pub booking_id: String,
    pub conversation_id: Option<ConversationId>,
    pub customer_phone: String,
    pub service: String,
    pub date: String,
    pub time: String,
}

impl From<&Booking> for BookingRef {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id.clone(),
            conversation_id: booking.conversation_id.clone(),
            customer_phone: booking.customer_phone.clone(),
            service: booking.service.clone(),
            date: booking.date.clone(),
            time: booking.time.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationPayload {
    NewBooking(BookingRef),
    BookingCancelled(BookingRef),
    BookingUpdated(BookingRef),
    ReminderPending(BookingRef),
    NoShow(BookingRef),
    Escalation {
        conversation_id: ConversationId,
        customer_phone: String,
        reason: String,
    },
    NewLead {
        conversation_id: ConversationId,
        name: String,
        email: Option<String>,
        interest: Option<String>,
    },
}

impl NotificationPayload {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::NewBooking(_) => NotificationKind::NewBooking,
            Self::BookingCancelled(_) => NotificationKind::BookingCancelled,
            Self::BookingUpdated(_) => NotificationKind::BookingUpdated,
            Self::ReminderPending(_) => NotificationKind::ReminderPending,
            Self::NoShow(_) => NotificationKind::NoShow,
            Self::Escalation { .. } => NotificationKind::Escalation,
            Self::NewLead { .. } => NotificationKind::NewLead,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::NewBooking(_) => "New booking",
            Self::BookingCancelled(_) => "Booking cancelled",
            Self::BookingUpdated(_) => "Booking rescheduled",
            Self::ReminderPending(_) => "Upcoming appointment",
            Self::NoShow(_) => "Missed appointment",
            Self::Escalation { .. } => "Customer needs a human",
            Self::NewLead { .. } => "New lead",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::NewBooking(b) => format!(
                "{} booked {} on {} at {}.",
                b.customer_phone, b.service, b.date, b.time
            ),
            Self::BookingCancelled(b) => format!(
                "{} cancelled {} on {} at {}.",
                b.customer_phone, b.service, b.date, b.time
            ),
            Self::BookingUpdated(b) => format!(
                "{} moved {} to {} at {}.",
                b.customer_phone, b.service, b.date, b.time
            ),
            Self::ReminderPending(b) => format!(
                "{} with {} on {} at {}.",
                b.service, b.customer_phone, b.date, b.time
            ),
            Self::NoShow(b) => format!(
                "{} did not show up for {} on {} at {}.",
                b.customer_phone, b.service, b.date, b.time
            ),
            Self::Escalation {
                customer_phone,
                reason,
                ..
            } => format!("{customer_phone}: {reason}"),
            Self::NewLead {
                name,
                email,
                interest,
                ..
            } => {
                let mut message = name.clone();
                if let Some(email) = email {
                    message.push_str(&format!(" <{email}>"));
                }
                if let Some(interest) = interest {
                    message.push_str(&format!(" is interested in: {interest}"));
                }
                message
            }
        }
    }

    fn booking_id(&self) -> Option<String> {
        match self {
            Self::NewBooking(b)
            | Self::BookingCancelled(b)
            | Self::BookingUpdated(b)
            | Self::ReminderPending(b)
            | Self::NoShow(b) => Some(b.booking_id.clone()),
            _ => None,
        }
    }

    fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            Self::NewBooking(b)
            | Self::BookingCancelled(b)
            | Self::BookingUpdated(b)
            | Self::ReminderPending(b)
            | Self::NoShow(b) => b.conversation_id.clone(),
            Self::Escalation {
                conversation_id, ..
            }
            | Self::NewLead {
                conversation_id, ..
            } => Some(conversation_id.clone()),
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    storage: Arc<dyn StorageAdapter>,
}

impl Notifier {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Persist a notification for the tenant's dashboard. Returns `None` if
    /// it could not be stored.
    pub async fn emit(
        &self,
        tenant_id: &TenantId,
        payload: NotificationPayload,
    ) -> Option<Notification> {
        let kind = payload.kind();
        let notification = NewNotification {
            tenant_id: tenant_id.clone(),
            kind,
            title: payload.title().to_string(),
            message: payload.message(),
            booking_id: payload.booking_id(),
            conversation_id: payload.conversation_id(),
        };
        match self.storage.insert_notification(notification).await {
            Ok(stored) => {
                debug!(tenant_id = %tenant_id, kind = %kind, "notification emitted");
                record_notification(&kind.to_string());
                Some(stored)
            }
            Err(e) => {
                warn!(tenant_id = %tenant_id, kind = %kind, error = %e, "failed to store notification");
                None
            }
        }
    }
}
