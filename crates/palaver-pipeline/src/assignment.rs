// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Automatic distribution of conversations to human agents.
//!
//! Selection and the capacity check run inside the storage claim, so this
//! module only decides *when* to claim and reports the result. Running out
//! of agents is a normal outcome, not an error.

use std::sync::Arc;

use palaver_core::{
    Actor, AgentId, AssignmentClaim, ConversationId, PalaverError, StorageAdapter, Tenant,
    TenantId,
};
use palaver_prometheus::record_assignment;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentResult {
    pub assigned: bool,
    pub agent_id: Option<AgentId>,
    pub reason: String,
}

impl AssignmentResult {
    fn assigned(agent_id: AgentId) -> Self {
        Self {
            reason: format!("assigned to {agent_id}"),
            assigned: true,
            agent_id: Some(agent_id),
        }
    }

    fn not_assigned(reason: impl Into<String>) -> Self {
        Self {
            assigned: false,
            agent_id: None,
            reason: reason.into(),
        }
    }
}

/// What happened to an agent's conversations when they were taken off duty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReassignmentReport {
    pub released: Vec<ConversationId>,
    pub reassigned: Vec<(ConversationId, AgentId)>,
    /// Released conversations no other agent could take.
    pub unassigned: Vec<ConversationId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityChange {
    /// No such agent for that tenant.
    UnknownAgent,
    Updated,
    /// The agent went unavailable and their open conversations were redistributed.
    Reassigned(ReassignmentReport),
}

#[derive(Clone)]
pub struct AssignmentEngine {
    storage: Arc<dyn StorageAdapter>,
}

impl AssignmentEngine {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Assign an unassigned conversation according to the tenant's strategy.
    pub async fn auto_assign(
        &self,
        tenant: &Tenant,
        conversation_id: &ConversationId,
    ) -> Result<AssignmentResult, PalaverError> {
        self.claim(tenant, conversation_id, None).await
    }

    /// Release every open conversation held by `agent_id` and hand each to
    /// another agent where capacity allows.
    pub async fn reassign_from_agent(
        &self,
        tenant: &Tenant,
        agent_id: &AgentId,
    ) -> Result<ReassignmentReport, PalaverError> {
        let released = self
            .storage
            .release_agent_conversations(&tenant.id, agent_id, Actor::Dashboard)
            .await?;

        let mut report = ReassignmentReport {
            released: released.clone(),
            ..Default::default()
        };
        for conversation_id in released {
            let result = self.claim(tenant, &conversation_id, Some(agent_id)).await?;
            match result.agent_id {
                Some(new_agent) => report.reassigned.push((conversation_id, new_agent)),
                None => report.unassigned.push(conversation_id),
            }
        }
        info!(
            tenant_id = %tenant.id,
            agent_id = %agent_id,
            released = report.released.len(),
            reassigned = report.reassigned.len(),
            "conversations reassigned away from agent"
        );
        Ok(report)
    }

    /// Admin toggle for an agent's availability. Going unavailable triggers
    /// reassignment of the agent's open conversations.
    pub async fn set_agent_availability(
        &self,
        tenant_id: &TenantId,
        agent_id: &AgentId,
        available: bool,
    ) -> Result<AvailabilityChange, PalaverError> {
        if !self
            .storage
            .set_agent_availability(tenant_id, agent_id, available)
            .await?
        {
            return Ok(AvailabilityChange::UnknownAgent);
        }
        if available {
            return Ok(AvailabilityChange::Updated);
        }
        let tenant = self
            .storage
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| PalaverError::Internal(format!("agent {agent_id} has no tenant")))?;
        let report = self.reassign_from_agent(&tenant, agent_id).await?;
        Ok(AvailabilityChange::Reassigned(report))
    }

    async fn claim(
        &self,
        tenant: &Tenant,
        conversation_id: &ConversationId,
        exclude_agent: Option<&AgentId>,
    ) -> Result<AssignmentResult, PalaverError> {
        if !tenant.auto_assign_enabled() {
            return Ok(AssignmentResult::not_assigned("auto-assignment disabled"));
        }
        let claimed = self
            .storage
            .claim_agent(AssignmentClaim {
                tenant_id: tenant.id.clone(),
                conversation_id: conversation_id.clone(),
                strategy: tenant.assignment_strategy,
                exclude_agent: exclude_agent.cloned(),
                actor: Actor::Pipeline,
            })
            .await;
        let result = match claimed {
            Ok(Some(agent)) => AssignmentResult::assigned(agent.id),
            Ok(None) => AssignmentResult::not_assigned("no available agent with spare capacity"),
            Err(e) => {
                record_assignment("error");
                return Err(e);
            }
        };
        record_assignment(if result.assigned {
            "assigned"
        } else {
            "no_candidate"
        });
        debug!(
            tenant_id = %tenant.id,
            conversation_id = %conversation_id,
            assigned = result.assigned,
            reason = %result.reason,
            "auto-assignment"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestStore, agent, tenant};
    use palaver_core::AssignmentStrategy;

    async fn open_conversation(store: &TestStore, tenant_id: &str, phone: &str) -> ConversationId {
        store
            .storage()
            .upsert_conversation(&TenantId::new(tenant_id), phone, None, Actor::Pipeline)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn round_robin_prefers_never_assigned_then_oldest() {
        let store = TestStore::new().await;
        let t = tenant("t1", "15550001111");
        store.seed_tenant(&t).await;
        let mut a = agent("a", "t1", 5);
        a.last_assigned_at = Some("2026-03-01T09:00:00.000Z".into());
        store.seed_agent(&a).await;
        store.seed_agent(&agent("b", "t1", 5)).await;
        store.seed_agent(&agent("c", "t1", 5)).await;
        let engine = AssignmentEngine::new(store.storage());

        let mut order = Vec::new();
        for phone in ["331", "332", "333"] {
            let conv = open_conversation(&store, "t1", phone).await;
            let result = engine.auto_assign(&t, &conv).await.unwrap();
            order.push(result.agent_id.unwrap().0);
        }
        assert_eq!(order, ["b", "c", "a"]);
    }

    #[tokio::test]
    async fn manual_strategy_and_disabled_flag_never_assign() {
        let store = TestStore::new().await;
        let mut t = tenant("t1", "15550001111");
        t.assignment_strategy = AssignmentStrategy::Manual;
        store.seed_tenant(&t).await;
        store.seed_agent(&agent("a", "t1", 5)).await;
        let engine = AssignmentEngine::new(store.storage());
        let conv = open_conversation(&store, "t1", "331").await;

        let result = engine.auto_assign(&t, &conv).await.unwrap();
        assert!(!result.assigned);

        t.assignment_strategy = AssignmentStrategy::LeastBusy;
        t.auto_assign = false;
        assert!(!engine.auto_assign(&t, &conv).await.unwrap().assigned);
    }

    #[tokio::test]
    async fn full_agents_yield_no_assignment() {
        let store = TestStore::new().await;
        let t = tenant("t1", "15550001111");
        store.seed_tenant(&t).await;
        store.seed_agent(&agent("a", "t1", 1)).await;
        let engine = AssignmentEngine::new(store.storage());

        let first = open_conversation(&store, "t1", "331").await;
        assert!(engine.auto_assign(&t, &first).await.unwrap().assigned);
        let second = open_conversation(&store, "t1", "332").await;
        let result = engine.auto_assign(&t, &second).await.unwrap();
        assert!(!result.assigned);
        assert_eq!(result.agent_id, None);
    }

    #[tokio::test]
    async fn going_unavailable_moves_conversations_to_other_agents() {
        let store = TestStore::new().await;
        let mut t = tenant("t1", "15550001111");
        t.assignment_strategy = AssignmentStrategy::LeastBusy;
        store.seed_tenant(&t).await;
        store.seed_agent(&agent("a", "t1", 5)).await;
        let engine = AssignmentEngine::new(store.storage());

        let c1 = open_conversation(&store, "t1", "331").await;
        let c2 = open_conversation(&store, "t1", "332").await;
        engine.auto_assign(&t, &c1).await.unwrap();
        engine.auto_assign(&t, &c2).await.unwrap();

        // Agent b has room for only one of the two.
        store.seed_agent(&agent("b", "t1", 1)).await;
        let change = engine
            .set_agent_availability(&t.id, &AgentId::new("a"), false)
            .await
            .unwrap();
        let AvailabilityChange::Reassigned(report) = change else {
            panic!("expected reassignment, got {change:?}");
        };
        assert_eq!(report.released.len(), 2);
        assert_eq!(report.reassigned.len(), 1);
        assert_eq!(report.reassigned[0].1, AgentId::new("b"));
        assert_eq!(report.unassigned.len(), 1);

        let loads = store.storage().list_agents(&t.id).await.unwrap();
        let a = loads.iter().find(|l| l.agent.id.as_str() == "a").unwrap();
        assert!(!a.agent.is_available);
        assert_eq!(a.active_count, 0);
    }

    #[tokio::test]
    async fn unknown_agent_and_going_available() {
        let store = TestStore::new().await;
        store.seed_tenant(&tenant("t1", "15550001111")).await;
        store.seed_agent(&agent("a", "t1", 5)).await;
        let engine = AssignmentEngine::new(store.storage());
        let tenant_id = TenantId::new("t1");

        assert_eq!(
            engine
                .set_agent_availability(&tenant_id, &AgentId::new("zz"), false)
                .await
                .unwrap(),
            AvailabilityChange::UnknownAgent
        );
        assert_eq!(
            engine
                .set_agent_availability(&tenant_id, &AgentId::new("a"), true)
                .await
                .unwrap(),
            AvailabilityChange::Updated
        );
    }
}
