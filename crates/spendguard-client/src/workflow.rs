//! Run provisioning workflow.
//!
//! Provisioning is a forward-only state machine:
//!
//! ```text
//! Start -> HealthChecked -> AgentCreated -> BudgetSet -> RunCreated -> Done
//!   \________(skip health)___/                  \_______(no run)_______/
//! ```
//!
//! Any failing step moves the workflow to `Failed` and stops it. Nothing is
//! rolled back: an agent created before a failed budget call stays on the
//! guard, and its id is reported in the [`ProvisionError`].

use crate::api_types::{Agent, BudgetSnapshot, BudgetSpec, Run};
use crate::client::GuardApi;
use crate::error::ClientError;
use serde::Serialize;
use spendguard_core::log_workflow_step;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// A remote call made while provisioning or generating traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    HealthCheck,
    CreateAgent,
    SetBudget,
    CreateRun,
    /// Metered request number `sequence` (1-based)
    MeteredRequest { sequence: u32 },
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::HealthCheck => "health_check",
            WorkflowStep::CreateAgent => "create_agent",
            WorkflowStep::SetBudget => "set_budget",
            WorkflowStep::CreateRun => "create_run",
            WorkflowStep::MeteredRequest { .. } => "metered_request",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStep::MeteredRequest { sequence } => write!(f, "metered_request #{sequence}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A step failed; the workflow stopped there.
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct ProvisionError {
    /// Step that failed
    pub step: WorkflowStep,
    /// Agent created before the failure, left in place on the guard
    pub agent_id: Option<String>,
    #[source]
    pub source: ClientError,
}

impl ProvisionError {
    pub fn new(step: WorkflowStep, agent_id: Option<String>, source: ClientError) -> Self {
        Self {
            step,
            agent_id,
            source,
        }
    }
}

/// Everything a successful provisioning returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionedAgent {
    pub agent_id: String,
    pub budget: BudgetSnapshot,
    pub run: Option<Run>,
}

/// Workflow state. Transitions only move forward.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
    Start,
    HealthChecked,
    AgentCreated {
        agent: Agent,
    },
    BudgetSet {
        agent: Agent,
        budget: BudgetSnapshot,
    },
    RunCreated {
        agent: Agent,
        budget: BudgetSnapshot,
        run: Run,
    },
    Done(ProvisionedAgent),
    Failed {
        step: WorkflowStep,
        agent_id: Option<String>,
    },
}

impl WorkflowState {
    /// Id of the agent created so far, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            WorkflowState::AgentCreated { agent }
            | WorkflowState::BudgetSet { agent, .. }
            | WorkflowState::RunCreated { agent, .. } => Some(&agent.agent_id),
            WorkflowState::Done(done) => Some(&done.agent_id),
            WorkflowState::Failed { agent_id, .. } => agent_id.as_deref(),
            WorkflowState::Start | WorkflowState::HealthChecked => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done(_) | WorkflowState::Failed { .. })
    }
}

/// What to provision.
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    pub agent_name: String,
    pub budget: BudgetSpec,
    /// Require `/health` to report `ok` before anything is created
    pub check_health: bool,
    /// Create a run after the budget is set
    pub create_run: bool,
}

impl ProvisioningPlan {
    pub fn new(agent_name: impl Into<String>, budget: BudgetSpec) -> Self {
        Self {
            agent_name: agent_name.into(),
            budget,
            check_health: true,
            create_run: false,
        }
    }

    pub fn with_health_check(mut self, check_health: bool) -> Self {
        self.check_health = check_health;
        self
    }

    pub fn with_run(mut self, create_run: bool) -> Self {
        self.create_run = create_run;
        self
    }
}

/// Drives a [`ProvisioningPlan`] against a guard.
pub struct ProvisioningWorkflow<'a, A: GuardApi + ?Sized> {
    api: &'a A,
    plan: ProvisioningPlan,
    state: WorkflowState,
}

impl<'a, A: GuardApi + ?Sized> ProvisioningWorkflow<'a, A> {
    pub fn new(api: &'a A, plan: ProvisioningPlan) -> Self {
        Self {
            api,
            plan,
            state: WorkflowState::Start,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Remote call the next [`advance`](Self::advance) will make, or `None`
    /// once the workflow is terminal.
    pub fn next_step(&self) -> Option<WorkflowStep> {
        match &self.state {
            WorkflowState::Start if self.plan.check_health => Some(WorkflowStep::HealthCheck),
            WorkflowState::Start | WorkflowState::HealthChecked => Some(WorkflowStep::CreateAgent),
            WorkflowState::AgentCreated { .. } => Some(WorkflowStep::SetBudget),
            WorkflowState::BudgetSet { .. } if self.plan.create_run => {
                Some(WorkflowStep::CreateRun)
            }
            _ => None,
        }
    }

    /// Make the next remote call and move to the following state.
    ///
    /// Does nothing once the workflow is terminal.
    pub async fn advance(&mut self) -> Result<(), ProvisionError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        let Some(step) = self.next_step() else {
            self.finish();
            return Ok(());
        };
        let agent_id = self.state.agent_id().map(str::to_string);

        match self.execute().await {
            Ok(next) => {
                self.state = next;
                if self.next_step().is_none() {
                    self.finish();
                }
                Ok(())
            }
            Err(source) => {
                warn!(step = step.as_str(), agent_id = ?agent_id, error = %source, "Provisioning step failed");
                self.state = WorkflowState::Failed {
                    step,
                    agent_id: agent_id.clone(),
                };
                Err(ProvisionError::new(step, agent_id, source))
            }
        }
    }

    /// Run every remaining step.
    pub async fn run(mut self) -> Result<ProvisionedAgent, ProvisionError> {
        loop {
            self.advance().await?;
            match self.state {
                WorkflowState::Done(done) => return Ok(done),
                WorkflowState::Failed { step, ref agent_id } => {
                    return Err(ProvisionError::new(
                        step,
                        agent_id.clone(),
                        ClientError::validation("workflow already failed"),
                    ));
                }
                _ => {}
            }
        }
    }

    async fn execute(&mut self) -> Result<WorkflowState, ClientError> {
        let state = std::mem::replace(&mut self.state, WorkflowState::Start);
        match state {
            WorkflowState::Start if self.plan.check_health => {
                let health = self.api.health().await?;
                if !health.is_ok() {
                    return Err(ClientError::Unhealthy {
                        status: health.status.unwrap_or_else(|| "missing".to_string()),
                    });
                }
                log_workflow_step!(WorkflowStep::HealthCheck.as_str());
                Ok(WorkflowState::HealthChecked)
            }
            WorkflowState::Start | WorkflowState::HealthChecked => {
                let agent = self.api.create_agent(&self.plan.agent_name).await?;
                log_workflow_step!(
                    WorkflowStep::CreateAgent.as_str(),
                    agent_id = %agent.agent_id,
                    name = %self.plan.agent_name
                );
                Ok(WorkflowState::AgentCreated { agent })
            }
            WorkflowState::AgentCreated { agent } => {
                let budget = self
                    .api
                    .set_budget(&agent.agent_id, &self.plan.budget)
                    .await?;
                log_workflow_step!(
                    WorkflowStep::SetBudget.as_str(),
                    agent_id = %agent.agent_id,
                    hard_limit_cents = self.plan.budget.hard_limit_cents(),
                    remaining_cents = ?budget.remaining_cents
                );
                Ok(WorkflowState::BudgetSet { agent, budget })
            }
            WorkflowState::BudgetSet { agent, budget } => {
                let run = self.api.create_run(&agent.agent_id).await?;
                log_workflow_step!(
                    WorkflowStep::CreateRun.as_str(),
                    agent_id = %agent.agent_id,
                    run_id = %run.run_id
                );
                Ok(WorkflowState::RunCreated { agent, budget, run })
            }
            terminal => Ok(terminal),
        }
    }

    fn finish(&mut self) {
        let state = std::mem::replace(&mut self.state, WorkflowState::Start);
        self.state = match state {
            WorkflowState::BudgetSet { agent, budget } => WorkflowState::Done(ProvisionedAgent {
                agent_id: agent.agent_id,
                budget,
                run: None,
            }),
            WorkflowState::RunCreated { agent, budget, run } => {
                WorkflowState::Done(ProvisionedAgent {
                    agent_id: agent.agent_id,
                    budget,
                    run: Some(run),
                })
            }
            other => other,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_types::{HealthStatus, JsonObject, ResponsesRequest};
    use crate::error::Result;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    /// Records calls and fails the configured step.
    #[derive(Default)]
    struct ScriptedGuard {
        calls: Mutex<Vec<String>>,
        health_status: Option<String>,
        fail_budget: bool,
    }

    impl ScriptedGuard {
        fn healthy() -> Self {
            Self {
                health_status: Some("ok".into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl GuardApi for ScriptedGuard {
        async fn health(&self) -> Result<HealthStatus> {
            self.record("health");
            Ok(HealthStatus {
                status: self.health_status.clone(),
            })
        }

        async fn create_agent(&self, name: &str) -> Result<Agent> {
            self.record("create_agent");
            Agent::from_object("/v1/agents", object(json!({"agent_id": "agent-1", "name": name})))
        }

        async fn set_budget(&self, agent_id: &str, budget: &BudgetSpec) -> Result<BudgetSnapshot> {
            self.record("set_budget");
            if self.fail_budget {
                return Err(ClientError::Http {
                    status: 500,
                    method: "POST".into(),
                    path: format!("/v1/agents/{agent_id}/budget"),
                    detail: "boom".into(),
                });
            }
            Ok(BudgetSnapshot::from_object(object(json!({
                "agent_id": agent_id,
                "hard_limit_cents": budget.hard_limit_cents(),
                "remaining_cents": budget.topup_cents(),
            }))))
        }

        async fn create_run(&self, _agent_id: &str) -> Result<Run> {
            self.record("create_run");
            Run::from_object("/runs", object(json!({"run_id": "run-1"})))
        }

        async fn create_response(
            &self,
            _agent_id: &str,
            _run_id: &str,
            _request: &ResponsesRequest,
        ) -> Result<Value> {
            self.record("create_response");
            Ok(json!({}))
        }
    }

    fn plan() -> ProvisioningPlan {
        ProvisioningPlan::new("audit-agent", BudgetSpec::new(500, None).unwrap())
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let guard = ScriptedGuard::healthy();
        let done = ProvisioningWorkflow::new(&guard, plan().with_run(true))
            .run()
            .await
            .unwrap();

        assert_eq!(
            guard.calls(),
            vec!["health", "create_agent", "set_budget", "create_run"]
        );
        assert_eq!(done.agent_id, "agent-1");
        assert_eq!(done.budget.hard_limit_cents, Some(500));
        assert_eq!(done.run.unwrap().run_id, "run-1");
    }

    #[tokio::test]
    async fn test_skip_health_and_run() {
        let guard = ScriptedGuard::default();
        let done = ProvisioningWorkflow::new(&guard, plan().with_health_check(false))
            .run()
            .await
            .unwrap();

        assert_eq!(guard.calls(), vec!["create_agent", "set_budget"]);
        assert!(done.run.is_none());
    }

    #[tokio::test]
    async fn test_unhealthy_guard_stops_before_agent_creation() {
        let guard = ScriptedGuard {
            health_status: Some("degraded".into()),
            ..Default::default()
        };
        let err = ProvisioningWorkflow::new(&guard, plan())
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.step, WorkflowStep::HealthCheck);
        assert!(matches!(err.source, ClientError::Unhealthy { ref status } if status == "degraded"));
        assert_eq!(guard.calls(), vec!["health"]);
    }

    #[tokio::test]
    async fn test_budget_failure_keeps_agent_and_stops() {
        let guard = ScriptedGuard {
            health_status: Some("ok".into()),
            fail_budget: true,
            ..Default::default()
        };
        let mut workflow = ProvisioningWorkflow::new(&guard, plan().with_run(true));

        workflow.advance().await.unwrap();
        workflow.advance().await.unwrap();
        let err = workflow.advance().await.unwrap_err();

        assert_eq!(err.step, WorkflowStep::SetBudget);
        assert_eq!(err.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(
            workflow.state(),
            &WorkflowState::Failed {
                step: WorkflowStep::SetBudget,
                agent_id: Some("agent-1".into())
            }
        );

        // Terminal: no further calls
        assert!(workflow.state().is_terminal());
        assert_eq!(workflow.next_step(), None);
        workflow.advance().await.unwrap();
        workflow.advance().await.unwrap();
        assert_eq!(guard.calls(), vec!["health", "create_agent", "set_budget"]);
        assert!(matches!(workflow.state(), WorkflowState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_next_step_tracks_state() {
        let guard = ScriptedGuard::healthy();
        let mut workflow = ProvisioningWorkflow::new(&guard, plan());

        assert_eq!(workflow.next_step(), Some(WorkflowStep::HealthCheck));
        workflow.advance().await.unwrap();
        assert_eq!(workflow.next_step(), Some(WorkflowStep::CreateAgent));
        workflow.advance().await.unwrap();
        assert_eq!(workflow.next_step(), Some(WorkflowStep::SetBudget));
        workflow.advance().await.unwrap();
        assert!(matches!(workflow.state(), WorkflowState::Done(_)));
        assert!(workflow.state().is_terminal());
        assert_eq!(workflow.state().agent_id(), Some("agent-1"));

        // Done stays done
        workflow.advance().await.unwrap();
        assert!(matches!(workflow.state(), WorkflowState::Done(_)));
        assert_eq!(guard.calls(), vec!["health", "create_agent", "set_budget"]);
    }

    #[test]
    fn test_only_done_and_failed_are_terminal() {
        assert!(!WorkflowState::Start.is_terminal());
        assert!(!WorkflowState::HealthChecked.is_terminal());
        assert!(
            WorkflowState::Failed {
                step: WorkflowStep::CreateAgent,
                agent_id: None
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_step_display() {
        assert_eq!(WorkflowStep::SetBudget.to_string(), "set_budget");
        assert_eq!(
            WorkflowStep::MeteredRequest { sequence: 3 }.to_string(),
            "metered_request #3"
        );
    }
}
