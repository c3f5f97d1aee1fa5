/// UI-Butler server entry point
///
/// Loads configuration from the environment (and `.env`) and serves:
/// - Auth and account routes at /auth/* and /users/me
/// - Workflow management and runs at /workflows/*
/// - Execution status and approvals at /executions/*
/// - Billing and analytics at /billing/* and /analytics/*
/// - Health check at /healthz

use uibutler::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::default();

    start_server(config).await
}
