//! Live event follower

use anyhow::{Context, Result};
use cd_api_contract::ChannelEvent;
use cd_core::{LogLevel, Msg};
use clap::Args;
use tracing::{info, warn};

use crate::server::ServerArgs;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Only show events for this crew
    #[arg(long, value_name = "CREW")]
    pub crew: Option<String>,

    /// Skip replaying the server's activity backlog
    #[arg(long)]
    pub no_history: bool,
}

impl WatchArgs {
    pub async fn run(self, server: &ServerArgs) -> Result<()> {
        let mut dashboard = server.dashboard()?;
        let crews = dashboard.load_catalog().await?;
        dashboard
            .connect()
            .await
            .context("Failed to subscribe to crew events")?;
        info!(crews, server = %server.server, "watching crew events");

        if !self.no_history {
            match dashboard.load_history().await {
                Ok(applied) => info!(applied, "replayed activity history"),
                Err(error) => warn!(%error, "activity history unavailable"),
            }
            for item in dashboard.model().activity().iter() {
                if self.wants(item.crew_id.as_deref()) {
                    println!(
                        "{} {:<7} {}",
                        item.timestamp.format("%H:%M:%S"),
                        item.level.as_str(),
                        item.message
                    );
                }
            }
        }

        let shutdown = dashboard.shutdown_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });

        while let Some(msg) = dashboard.next_message().await {
            match &msg {
                Msg::Channel(event) if self.wants(event_crew(event)) => {
                    if let Some(line) = describe(event) {
                        println!("{line}");
                    }
                }
                Msg::ChannelError(error) if error.is_network() => {
                    eprintln!("connection problem: {error}");
                }
                _ => {}
            }
            dashboard.apply(msg);
        }

        dashboard.teardown();
        Ok(())
    }

    fn wants(&self, crew_id: Option<&str>) -> bool {
        match (&self.crew, crew_id) {
            (None, _) => true,
            (Some(wanted), Some(id)) => wanted == id,
            (Some(_), None) => false,
        }
    }
}

fn event_crew(event: &ChannelEvent) -> Option<&str> {
    match event {
        ChannelEvent::CrewLog(log) => Some(&log.crew_id),
        ChannelEvent::CrewUpdated(crew) => Some(&crew.id),
        ChannelEvent::CrewStarted(p)
        | ChannelEvent::CrewStartAck(p)
        | ChannelEvent::CrewStopped(p)
        | ChannelEvent::StopRequested(p) => Some(&p.crew_id),
        ChannelEvent::CrewError(p) => Some(&p.crew_id),
        ChannelEvent::CrewsUpdated(_)
        | ChannelEvent::ActivityHistory(_)
        | ChannelEvent::ServerError(_) => None,
    }
}

/// One printable line per event
pub fn describe(event: &ChannelEvent) -> Option<String> {
    let line = match event {
        ChannelEvent::CrewLog(log) => {
            let level = LogLevel::normalize(log.level.as_deref());
            format!(
                "{} {:<7} [{}] {}: {}",
                log.timestamp.format("%H:%M:%S"),
                level.as_str(),
                log.crew_id,
                log.agent,
                log.message
            )
        }
        ChannelEvent::CrewsUpdated(crews) => format!("catalog updated ({} crews)", crews.len()),
        ChannelEvent::CrewUpdated(crew) => format!("[{}] updated", crew.id),
        ChannelEvent::CrewStarted(p) => match &p.process_id {
            Some(pid) => format!("[{}] started (pid {pid})", p.crew_id),
            None => format!("[{}] started", p.crew_id),
        },
        ChannelEvent::CrewStartAck(p) => format!("[{}] start accepted", p.crew_id),
        ChannelEvent::CrewStopped(p) => match p.exit_code {
            Some(code) if code != 0 => format!("[{}] stopped (exit code {code})", p.crew_id),
            _ => format!("[{}] stopped", p.crew_id),
        },
        ChannelEvent::StopRequested(p) => format!("[{}] stop requested", p.crew_id),
        ChannelEvent::CrewError(p) => format!("[{}] failed: {}", p.crew_id, p.error),
        ChannelEvent::ServerError(p) => format!("server error: {}", p.message),
        ChannelEvent::ActivityHistory(_) => return None,
    };
    Some(line)
}
