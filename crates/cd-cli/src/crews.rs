//! Crew listing and start/stop commands

use anyhow::{Context, Result};
use cd_core::{
    Combinator, Condition, FilterConfig, FilterField, FilterOperator, FilterQuery, Msg, RunState,
    SortKey, ViewModel,
};
use clap::Args;
use serde_json::{Map, Value};
use tracing::debug;

use crate::server::{RestDashboard, ServerArgs};

/// Parse a `KEY=VALUE` start input
pub fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' in '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Free-text search over names, descriptions, agents, tasks and tokens
    #[arg(short, long, value_name = "TEXT")]
    pub query: Option<String>,

    /// Keep crews with any of these status tokens
    #[arg(long = "status", value_name = "STATUS")]
    pub statuses: Vec<String>,

    /// Keep crews carrying these tags
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Require every --tag instead of any
    #[arg(long)]
    pub all_tags: bool,

    /// Combine the status and tag conditions with OR instead of AND
    #[arg(long)]
    pub any: bool,

    /// Sort order
    #[arg(long, default_value = "name-asc", value_name = "KEY")]
    pub sort: SortKey,

    /// Print the rows as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn query(&self) -> FilterQuery {
        let mut conditions = Vec::new();
        if !self.statuses.is_empty() {
            conditions.push(Condition::new(
                FilterField::Status,
                FilterOperator::IncludesAny,
                &self.statuses,
            ));
        }
        if !self.tags.is_empty() {
            let operator = if self.all_tags {
                FilterOperator::IncludesAll
            } else {
                FilterOperator::IncludesAny
            };
            conditions.push(Condition::new(FilterField::Tags, operator, &self.tags));
        }
        let combinator = if self.any {
            Combinator::Or
        } else {
            Combinator::And
        };

        FilterQuery::default()
            .with_text(self.query.clone().unwrap_or_default())
            .with_filter(FilterConfig::new(combinator, conditions))
            .with_sort(self.sort)
    }

    pub async fn run(self, server: &ServerArgs) -> Result<()> {
        let mut dashboard = server.dashboard()?;
        dashboard.load_catalog().await?;
        if let Err(error) = dashboard.load_history().await {
            debug!(%error, "activity history unavailable; run states may be stale");
        }

        let vm = dashboard.view(&self.query());
        if self.json {
            let rows: Vec<Value> = vm
                .rows
                .iter()
                .map(|row| {
                    serde_json::json!({
                        "id": row.id,
                        "name": row.name,
                        "status": row.status,
                        "runState": row.run_state,
                        "agents": row.agent_count,
                        "lastLogAt": row.last_log_at,
                        "tags": row.tags,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            print_table(&vm);
        }
        Ok(())
    }
}

fn print_table(vm: &ViewModel) {
    if vm.rows.is_empty() {
        println!("No crews match ({} known)", vm.total_crews);
        return;
    }

    let id_width = vm.rows.iter().map(|r| r.id.len()).max().unwrap_or(2).max(2);
    let name_width = vm.rows.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);
    println!(
        "{:<id_width$}  {:<name_width$}  {:<10}  {:<13}  {:>6}  TAGS",
        "ID", "NAME", "STATUS", "STATE", "AGENTS"
    );
    for row in &vm.rows {
        println!(
            "{:<id_width$}  {:<name_width$}  {:<10}  {:<13}  {:>6}  {}",
            row.id,
            row.name,
            row.status,
            row.run_state.as_str(),
            row.agent_count,
            row.tags.join(",")
        );
    }
    println!();
    println!(
        "{} of {} crews, {} running",
        vm.rows.len(),
        vm.total_crews,
        vm.running_count
    );
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Crew identifier
    pub crew: String,

    /// Start input as KEY=VALUE; repeatable
    #[arg(short = 'i', long = "input", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub inputs: Vec<(String, String)>,

    /// Wait until the backend confirms the crew started or failed
    #[arg(long)]
    pub wait: bool,
}

impl StartArgs {
    pub fn input_map(&self) -> Map<String, Value> {
        self.inputs
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect()
    }

    pub async fn run(self, server: &ServerArgs) -> Result<()> {
        let mut dashboard = server.dashboard()?;
        dashboard.load_catalog().await?;
        if self.wait {
            dashboard.connect().await.context("Failed to subscribe to crew events")?;
        }

        dashboard.start(&self.crew, &self.input_map()).await?;
        println!("Start requested for {}", self.crew);

        if self.wait {
            wait_for(&mut dashboard, &self.crew, RunState::Running).await?;
            println!("{} is running", self.crew);
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Crew identifier
    pub crew: String,

    /// Wait until the backend confirms the crew stopped
    #[arg(long)]
    pub wait: bool,
}

impl StopArgs {
    pub async fn run(self, server: &ServerArgs) -> Result<()> {
        let mut dashboard = server.dashboard()?;
        if self.wait {
            dashboard.connect().await.context("Failed to subscribe to crew events")?;
        }

        dashboard.stop(&self.crew).await?;
        println!("Stop requested for {}", self.crew);

        if self.wait {
            wait_for(&mut dashboard, &self.crew, RunState::Idle).await?;
            println!("{} stopped", self.crew);
        }
        Ok(())
    }
}

/// Apply channel messages until `crew_id` settles in `target` or an error surfaces
async fn wait_for(dashboard: &mut RestDashboard, crew_id: &str, target: RunState) -> Result<()> {
    let shutdown = dashboard.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    while let Some(msg) = dashboard.next_message().await {
        let is_event = matches!(msg, Msg::Channel(_));
        dashboard.apply(msg);

        if let Some(error) = dashboard.model().last_error() {
            anyhow::bail!("{error}");
        }
        if is_event && dashboard.model().state_of(crew_id) == target {
            return Ok(());
        }
    }
    anyhow::bail!("Interrupted before {crew_id} reached {target}")
}
