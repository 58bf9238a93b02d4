// src/main.rs
// Thin daemon binary: load config, wire the context, run the sync
// scheduler until signaled. The issue-tracker protocol itself is out of
// scope for this crate (see `IssueSource`) — integrators supply a real
// implementation; this binary runs against an empty project list so it
// starts cleanly without one.

use std::sync::Arc;

use async_trait::async_trait;
use ivdex::config::AppConfig;
use ivdex::context::AppContext;
use ivdex::scheduler::run_daemon;
use ivdex::sync::{IssueSource, IssuePage, SyncError, SyncResult};
use ivdex::model::{RawComment, RawIssue};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct NullIssueSource;

#[async_trait]
impl IssueSource for NullIssueSource {
    async fn list_projects(&self) -> SyncResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn fetch_issue_page(&self, _page: &IssuePage) -> SyncResult<Vec<RawIssue>> {
        Err(SyncError::source("no IssueSource configured for this deployment"))
    }

    async fn fetch_comments(&self, _issue_key: &str) -> SyncResult<Vec<RawComment>> {
        Err(SyncError::source("no IssueSource configured for this deployment"))
    }

    async fn existing_keys(&self, _project_key: &str, _keys: &[String]) -> SyncResult<std::collections::HashSet<String>> {
        Err(SyncError::source("no IssueSource configured for this deployment"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ivdex=info,warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    info!("starting ivdex sync daemon");

    let config = AppConfig::from_env()?;
    ivdex::config::install(config.clone())
        .unwrap_or_else(|e| warn!(error = %e, "config already installed"));

    if config.sync.projects.is_empty() {
        warn!("no IssueSource wired in; daemon will idle with zero configured projects");
    }

    let ctx = AppContext::new(config, Arc::new(NullIssueSource)).await?;

    run_daemon(ctx.scheduler).await?;

    Ok(())
}
