//! # spendguard-client
//!
//! Client side of the SpendGuard guard API: provisioning budgeted runs and
//! generating metered traffic for reconciliation.
//!
//! - [`GuardClient`] - reqwest implementation of [`GuardApi`]
//! - [`ProvisioningWorkflow`] - agent, budget, run; strict order, fail fast
//! - [`TrafficGenerator`] - N metered requests and the window they were sent in
//!
//! ## Example
//!
//! ```no_run
//! use spendguard_client::{BudgetSpec, GuardClient, GuardConfig, TrafficGenerator, TrafficPlan};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = GuardClient::new(&GuardConfig::default())?;
//! let plan = TrafficPlan::new("reconcile-test", BudgetSpec::new(500, None)?).with_requests(5);
//!
//! let report = TrafficGenerator::new(&client, plan)?.run().await?;
//! println!("window: {}", report.window);
//! # Ok(())
//! # }
//! ```

pub mod api_types;
pub mod client;
pub mod config;
pub mod error;
pub mod traffic;
pub mod workflow;

pub use api_types::{
    Agent, BudgetSnapshot, BudgetSpec, HealthStatus, JsonObject, Reasoning, ResponsesRequest, Run,
};
pub use client::{API_KEY_HEADER, GuardApi, GuardClient};
pub use config::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, GuardConfig};
pub use error::{ClientError, Result, extract_detail};
pub use traffic::{
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL, RunMode, TrafficGenerator, TrafficPlan,
    TrafficReport, prompt,
};
pub use workflow::{
    ProvisionError, ProvisionedAgent, ProvisioningPlan, ProvisioningWorkflow, WorkflowState,
    WorkflowStep,
};
