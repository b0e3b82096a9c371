//! Synthetic metered traffic for reconciliation tests.
//!
//! Provisions an agent through [`ProvisioningWorkflow`], then sends N
//! deterministic requests and records the window they were sent in, so the
//! ledger rows they produce can be reconciled afterwards.

use crate::api_types::{BudgetSpec, Reasoning, ResponsesRequest};
use crate::client::GuardApi;
use crate::error::{ClientError, Result};
use crate::workflow::{
    ProvisionError, ProvisionedAgent, ProvisioningPlan, ProvisioningWorkflow, WorkflowStep,
};
use chrono::Utc;
use serde::Serialize;
use spendguard_core::{ReconciliationWindow, log_workflow_step};
use std::time::Duration;
use tracing::info;

/// Default model for synthetic requests.
pub const DEFAULT_MODEL: &str = "gpt-5.2-pro";

/// Default output token cap per request.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 128;

/// How runs are allocated to requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// One run for all requests
    #[default]
    Shared,
    /// A fresh run before every request
    PerRequest,
}

/// Traffic to generate.
#[derive(Debug, Clone)]
pub struct TrafficPlan {
    pub agent_name: String,
    pub budget: BudgetSpec,
    pub model: String,
    pub requests: u32,
    pub max_output_tokens: u32,
    pub reasoning_effort: Option<String>,
    /// Pause between consecutive requests
    pub delay: Duration,
    pub run_mode: RunMode,
    pub check_health: bool,
}

impl TrafficPlan {
    pub fn new(agent_name: impl Into<String>, budget: BudgetSpec) -> Self {
        Self {
            agent_name: agent_name.into(),
            budget,
            model: DEFAULT_MODEL.to_string(),
            requests: 1,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            reasoning_effort: None,
            delay: Duration::ZERO,
            run_mode: RunMode::default(),
            check_health: true,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_requests(mut self, requests: u32) -> Self {
        self.requests = requests;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_reasoning_effort(mut self, effort: Option<String>) -> Self {
        self.reasoning_effort = effort.filter(|e| !e.trim().is_empty());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }

    pub fn with_health_check(mut self, check_health: bool) -> Self {
        self.check_health = check_health;
        self
    }

    /// Reject plans that would send nothing useful.
    pub fn validate(&self) -> Result<()> {
        if self.requests == 0 {
            return Err(ClientError::validation("request count must be greater than 0"));
        }
        if self.max_output_tokens == 0 {
            return Err(ClientError::validation(
                "max output tokens must be greater than 0",
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ClientError::validation("model must not be empty"));
        }
        Ok(())
    }

    /// Body of request number `sequence`.
    pub fn request(&self, sequence: u32) -> ResponsesRequest {
        ResponsesRequest {
            model: self.model.clone(),
            input: prompt(sequence),
            max_output_tokens: self.max_output_tokens,
            reasoning: self.reasoning_effort.as_ref().map(|effort| Reasoning {
                effort: effort.clone(),
            }),
        }
    }

    fn provisioning_plan(&self) -> ProvisioningPlan {
        ProvisioningPlan::new(self.agent_name.clone(), self.budget)
            .with_health_check(self.check_health)
            .with_run(self.run_mode == RunMode::Shared)
    }
}

/// Deterministic prompt for request number `sequence`.
pub fn prompt(sequence: u32) -> String {
    format!(
        "Give a concise, correct answer.\n\
         Task: Return the first 25 prime numbers as a comma-separated list.\n\
         Request number: {sequence}\n"
    )
}

/// Result of a traffic run.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficReport {
    pub agent_id: String,
    /// Run used by each request, in send order
    pub run_ids: Vec<String>,
    pub requests_sent: u32,
    /// From just before the first metered call to just after the last
    pub window: ReconciliationWindow,
}

impl TrafficReport {
    /// Reconcile command that covers this run's window.
    pub fn reconcile_hint(&self) -> String {
        format!(
            "spendguard-audit reconcile --start {} --end {} --sqlite <ledger.db> --openai-csv <export.csv>",
            self.window.start_iso(),
            self.window.end_iso()
        )
    }
}

/// Sends a [`TrafficPlan`] through a guard.
pub struct TrafficGenerator<'a, A: GuardApi + ?Sized> {
    api: &'a A,
    plan: TrafficPlan,
}

impl<'a, A: GuardApi + ?Sized> TrafficGenerator<'a, A> {
    /// Validates the plan; nothing is sent for an invalid one.
    pub fn new(api: &'a A, plan: TrafficPlan) -> Result<Self> {
        plan.validate()?;
        Ok(Self { api, plan })
    }

    pub fn plan(&self) -> &TrafficPlan {
        &self.plan
    }

    /// Provision, then send every request in order. Stops at the first error.
    pub async fn run(&self) -> std::result::Result<TrafficReport, ProvisionError> {
        let provisioned =
            ProvisioningWorkflow::new(self.api, self.plan.provisioning_plan())
                .run()
                .await?;
        let ProvisionedAgent { agent_id, run, .. } = provisioned;
        let shared_run = run.map(|run| run.run_id);

        let total = self.plan.requests;
        let mut run_ids = Vec::with_capacity(total as usize);
        let start = Utc::now();

        for sequence in 1..=total {
            let run_id = match &shared_run {
                Some(run_id) => run_id.clone(),
                None => {
                    let run = self
                        .api
                        .create_run(&agent_id)
                        .await
                        .map_err(|e| fail(WorkflowStep::CreateRun, &agent_id, e))?;
                    log_workflow_step!(
                        WorkflowStep::CreateRun.as_str(),
                        agent_id = %agent_id,
                        run_id = %run.run_id
                    );
                    run.run_id
                }
            };

            let step = WorkflowStep::MeteredRequest { sequence };
            self.api
                .create_response(&agent_id, &run_id, &self.plan.request(sequence))
                .await
                .map_err(|e| fail(step, &agent_id, e))?;
            log_workflow_step!(
                step.as_str(),
                sequence = sequence,
                total = total,
                run_id = %run_id
            );
            run_ids.push(run_id);

            if sequence < total && !self.plan.delay.is_zero() {
                tokio::time::sleep(self.plan.delay).await;
            }
        }

        let end = Utc::now().max(start);
        let window = ReconciliationWindow::new(start, end).map_err(|e| {
            fail(
                WorkflowStep::MeteredRequest { sequence: total },
                &agent_id,
                ClientError::validation(e.to_string()),
            )
        })?;

        info!(
            agent_id = %agent_id,
            requests = total,
            window = %window,
            "Traffic generation complete"
        );

        Ok(TrafficReport {
            agent_id,
            run_ids,
            requests_sent: total,
            window,
        })
    }
}

fn fail(step: WorkflowStep, agent_id: &str, source: ClientError) -> ProvisionError {
    ProvisionError::new(step, Some(agent_id.to_string()), source)
}
