// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant and FAQ queries.

use palaver_core::{Faq, PalaverError, Tenant, TenantId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::queries::{parse_column, parse_json};

fn load_tenant(
    conn: &rusqlite::Connection,
    filter: &str,
    key: &str,
) -> rusqlite::Result<Option<Tenant>> {
    let tenant = conn
        .query_row(
            &format!(
                "SELECT id, name, whatsapp_number, business_info, services,
                        assignment_strategy, auto_assign, is_active
                 FROM tenants WHERE {filter}"
            ),
            params![key],
            |row| {
                let services: String = row.get(4)?;
                Ok(Tenant {
                    id: TenantId(row.get(0)?),
                    name: row.get(1)?,
                    whatsapp_number: row.get(2)?,
                    business_info: row.get(3)?,
                    services: parse_json(4, &services)?,
                    faqs: Vec::new(),
                    assignment_strategy: parse_column(5, row.get(5)?)?,
                    auto_assign: row.get(6)?,
                    is_active: row.get(7)?,
                })
            },
        )
        .optional()?;

    let Some(mut tenant) = tenant else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT question, answer FROM faqs
         WHERE tenant_id = ?1 AND is_active = 1
         ORDER BY sort_order, id",
    )?;
    let faqs = stmt.query_map(params![tenant.id.as_str()], |row| {
        Ok(Faq {
            question: row.get(0)?,
            answer: row.get(1)?,
        })
    })?;
    tenant.faqs = faqs.collect::<Result<_, _>>()?;
    Ok(Some(tenant))
}

/// Look up the active tenant that owns a canonical destination number,
/// together with its active FAQs.
pub async fn find_by_number(db: &Database, number: &str) -> Result<Option<Tenant>, PalaverError> {
    let number = number.to_string();
    db.connection()
        .call(move |conn| load_tenant(conn, "whatsapp_number = ?1 AND is_active = 1", &number))
        .await
        .map_err(map_tr_err)
}

/// Look up a tenant by id, active or not.
pub async fn get_tenant(db: &Database, id: &TenantId) -> Result<Option<Tenant>, PalaverError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| load_tenant(conn, "id = ?1", &id))
        .await
        .map_err(map_tr_err)
}

/// Insert or replace a tenant and its FAQ list. Used by provisioning and tests.
pub async fn upsert_tenant(db: &Database, tenant: &Tenant) -> Result<(), PalaverError> {
    let tenant = tenant.clone();
    let services = serde_json::to_string(&tenant.services).map_err(PalaverError::storage)?;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO tenants (id, name, whatsapp_number, business_info, services,
                                      assignment_strategy, auto_assign, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    whatsapp_number = excluded.whatsapp_number,
                    business_info = excluded.business_info,
                    services = excluded.services,
                    assignment_strategy = excluded.assignment_strategy,
                    auto_assign = excluded.auto_assign,
                    is_active = excluded.is_active",
                params![
                    tenant.id.as_str(),
                    tenant.name,
                    tenant.whatsapp_number,
                    tenant.business_info,
                    services,
                    tenant.assignment_strategy.to_string(),
                    tenant.auto_assign,
                    tenant.is_active,
                ],
            )?;
            tx.execute("DELETE FROM faqs WHERE tenant_id = ?1", params![tenant.id.as_str()])?;
            for (i, faq) in tenant.faqs.iter().enumerate() {
                tx.execute(
                    "INSERT INTO faqs (tenant_id, question, answer, sort_order) VALUES (?1, ?2, ?3, ?4)",
                    params![tenant.id.as_str(), faq.question, faq.answer, i as i64],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
