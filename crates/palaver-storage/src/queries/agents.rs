// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent queries and the atomic assignment claim.
//!
//! Candidate selection, the capacity check, and the assignment write happen
//! in one `BEGIN IMMEDIATE` transaction on the single writer thread, so two
//! concurrent claims can never push an agent past `max_conversations`.

use palaver_core::{
    Actor, Agent, AgentId, AgentLoad, AssignmentClaim, AssignmentStrategy, ConversationId,
    PalaverError, TenantId, now_timestamp,
};
use rusqlite::{OptionalExtension, TransactionBehavior, params};

use crate::database::{Database, map_tr_err};
use crate::queries::conversations::append_audit;
use crate::queries::parse_column;

fn load_agents(conn: &rusqlite::Connection, tenant_id: &str) -> rusqlite::Result<Vec<AgentLoad>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.tenant_id, a.name, a.role, a.is_available, a.max_conversations,
                a.last_assigned_at,
                (SELECT COUNT(*) FROM conversations c
                 WHERE c.assigned_agent_id = a.id AND c.status IN ('active', 'escalated'))
         FROM agents a WHERE a.tenant_id = ?1 ORDER BY a.id",
    )?;
    let rows = stmt.query_map(params![tenant_id], |row| {
        Ok(AgentLoad {
            agent: Agent {
                id: AgentId(row.get(0)?),
                tenant_id: TenantId(row.get(1)?),
                name: row.get(2)?,
                role: parse_column(3, row.get(3)?)?,
                is_available: row.get(4)?,
                max_conversations: row.get(5)?,
                last_assigned_at: row.get(6)?,
            },
            active_count: row.get(7)?,
        })
    })?;
    rows.collect()
}

/// Pick the agent a strategy would assign next, among agents with spare capacity.
///
/// Round robin prefers never-assigned agents, then the oldest
/// `last_assigned_at`; least busy prefers the lowest active/capacity ratio.
/// Ties break on agent id so the choice is deterministic.
pub fn select_candidate<'a>(
    strategy: AssignmentStrategy,
    agents: &'a [AgentLoad],
    exclude: Option<&AgentId>,
) -> Option<&'a AgentLoad> {
    let mut candidates = agents.iter().filter(|load| {
        load.agent.is_available
            && load.active_count < load.agent.max_conversations
            && Some(&load.agent.id) != exclude
    });

    match strategy {
        AssignmentStrategy::Manual => None,
        AssignmentStrategy::RoundRobin => candidates.min_by(|a, b| {
            let key_a = (a.agent.last_assigned_at.is_some(), &a.agent.last_assigned_at, &a.agent.id);
            let key_b = (b.agent.last_assigned_at.is_some(), &b.agent.last_assigned_at, &b.agent.id);
            key_a.cmp(&key_b)
        }),
        AssignmentStrategy::LeastBusy => candidates.min_by(|a, b| {
            let ratio_a = f64::from(a.active_count) / f64::from(a.agent.max_conversations);
            let ratio_b = f64::from(b.active_count) / f64::from(b.agent.max_conversations);
            ratio_a.total_cmp(&ratio_b).then_with(|| a.agent.id.cmp(&b.agent.id))
        }),
    }
}

pub async fn list_agents(db: &Database, tenant_id: &TenantId) -> Result<Vec<AgentLoad>, PalaverError> {
    let tenant_id = tenant_id.as_str().to_string();
    db.connection()
        .call(move |conn| load_agents(conn, &tenant_id))
        .await
        .map_err(map_tr_err)
}

/// Select, capacity-check, and assign in one immediate transaction.
///
/// Returns `None` when no agent qualifies, or the conversation is missing,
/// closed, or already assigned.
pub async fn claim_agent(db: &Database, claim: AssignmentClaim) -> Result<Option<Agent>, PalaverError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let open_unassigned: Option<bool> = tx
                .query_row(
                    "SELECT assigned_agent_id IS NULL AND status IN ('active', 'escalated')
                     FROM conversations WHERE id = ?1 AND tenant_id = ?2",
                    params![claim.conversation_id.as_str(), claim.tenant_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if open_unassigned != Some(true) {
                return Ok(None);
            }

            let agents = load_agents(&tx, claim.tenant_id.as_str())?;
            let Some(chosen) = select_candidate(claim.strategy, &agents, claim.exclude_agent.as_ref())
            else {
                return Ok(None);
            };
            let mut agent = chosen.agent.clone();
            let now = now_timestamp();

            let changed = tx.execute(
                "UPDATE conversations
                 SET assigned_agent_id = ?1, assigned_at = ?2, updated_at = ?2, updated_by = ?3
                 WHERE id = ?4 AND assigned_agent_id IS NULL",
                params![
                    agent.id.as_str(),
                    now,
                    claim.actor.to_string(),
                    claim.conversation_id.as_str()
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            tx.execute(
                "UPDATE agents SET last_assigned_at = ?1 WHERE id = ?2",
                params![now, agent.id.as_str()],
            )?;
            append_audit(
                &tx,
                claim.conversation_id.as_str(),
                claim.actor,
                "assigned",
                Some(agent.id.as_str()),
            )?;
            tx.commit()?;

            agent.last_assigned_at = Some(now);
            Ok(Some(agent))
        })
        .await
        .map_err(map_tr_err)
}

/// Unassign every open conversation held by an agent.
pub async fn release_agent_conversations(
    db: &Database,
    tenant_id: &TenantId,
    agent_id: &AgentId,
    actor: Actor,
) -> Result<Vec<ConversationId>, PalaverError> {
    let tenant_id = tenant_id.as_str().to_string();
    let agent_id = agent_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM conversations
                     WHERE tenant_id = ?1 AND assigned_agent_id = ?2
                       AND status IN ('active', 'escalated')
                     ORDER BY last_message_at, id",
                )?;
                let rows = stmt.query_map(params![tenant_id, agent_id], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };
            let now = now_timestamp();
            for id in &ids {
                tx.execute(
                    "UPDATE conversations
                     SET assigned_agent_id = NULL, assigned_at = NULL, updated_at = ?1, updated_by = ?2
                     WHERE id = ?3",
                    params![now, actor.to_string(), id],
                )?;
                append_audit(&tx, id, actor, "unassigned", Some(&agent_id))?;
            }
            tx.commit()?;
            Ok(ids.into_iter().map(ConversationId).collect())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_availability(
    db: &Database,
    tenant_id: &TenantId,
    agent_id: &AgentId,
    available: bool,
) -> Result<bool, PalaverError> {
    let tenant_id = tenant_id.as_str().to_string();
    let agent_id = agent_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE agents SET is_available = ?1 WHERE id = ?2 AND tenant_id = ?3",
                params![available, agent_id, tenant_id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace an agent. Used by provisioning and tests.
pub async fn upsert_agent(db: &Database, agent: &Agent) -> Result<(), PalaverError> {
    let agent = agent.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO agents (id, tenant_id, name, role, is_available, max_conversations, last_assigned_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    role = excluded.role,
                    is_available = excluded.is_available,
                    max_conversations = excluded.max_conversations,
                    last_assigned_at = excluded.last_assigned_at",
                params![
                    agent.id.as_str(),
                    agent.tenant_id.as_str(),
                    agent.name,
                    agent.role.to_string(),
                    agent.is_available,
                    agent.max_conversations,
                    agent.last_assigned_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
