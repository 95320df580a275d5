use std::env;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use playmaker_core::projection::{
    attendance_summary, freshness, scoreboard, update_feed, workload_stats,
};
use playmaker_core::{
    DetachedTransport, ResourceHandle, ResourceKind, ResourceState, RestClient, SyncClient,
    SyncConfig,
};
use serde::Serialize;
use serde_json::Value;

use crate::config_profiles::{CliProfilesConfig, API_URL_ENV, PUSH_URL_ENV};
use crate::error::CliError;

/// Serializable view of one resource for `--json` output
#[derive(Debug, Serialize)]
pub struct ResourceView {
    pub handle: String,
    pub version: u64,
    pub freshness: String,
    pub pending: usize,
    pub last_synced_at: DateTime<Utc>,
    pub view: Value,
    pub payload: Value,
}

/// Effective sync settings for the selected profile.
pub fn load_sync_config(profile: Option<&str>) -> Result<SyncConfig, CliError> {
    let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = profiles.resolve_profile_name(profile);
    let profile = profiles.profile(&profile_name).cloned().unwrap_or_default();
    Ok(profile.sync_config(env::var(API_URL_ENV).ok(), env::var(PUSH_URL_ENV).ok())?)
}

pub fn parse_handle(raw: &str) -> Result<ResourceHandle, CliError> {
    Ok(raw.parse()?)
}

/// REST-only client for one-shot commands.
pub fn offline_client(config: &SyncConfig) -> Result<(SyncClient, RestClient), CliError> {
    if config.api_base_url.is_none() {
        return Err(CliError::ApiNotConfigured);
    }
    let rest = RestClient::from_config(config)?;
    let client = SyncClient::new(config, Arc::new(rest.clone()), Arc::new(DetachedTransport));
    Ok((client, rest))
}

/// Projection matching the resource kind, as JSON
pub fn project(state: &ResourceState) -> Result<Value, CliError> {
    let payload = &state.payload;
    let view = match state.handle.kind {
        ResourceKind::MatchScore => serde_json::to_value(scoreboard(payload))?,
        ResourceKind::AttendanceRoster => serde_json::to_value(attendance_summary(payload))?,
        ResourceKind::CoachWorkload => serde_json::to_value(workload_stats(payload))?,
        ResourceKind::UpdateFeed => serde_json::to_value(update_feed(payload))?,
    };
    Ok(view)
}

pub fn resource_view(state: &ResourceState) -> Result<ResourceView, CliError> {
    Ok(ResourceView {
        handle: state.handle.to_string(),
        version: state.version,
        freshness: freshness(state).to_string(),
        pending: state.pending_mutations.len(),
        last_synced_at: state.last_synced_at,
        view: project(state)?,
        payload: state.payload.clone(),
    })
}

pub fn format_sync_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Human-readable lines for one resource: a header plus its projection.
pub fn format_state_lines(state: &ResourceState) -> Vec<String> {
    let mut lines = vec![format!(
        "{}  v{}  [{}]  synced {}",
        state.handle,
        state.version,
        freshness(state),
        format_sync_timestamp(state.last_synced_at)
    )];
    let payload = &state.payload;

    match state.handle.kind {
        ResourceKind::MatchScore => {
            let board = scoreboard(payload);
            let leader = board
                .leader()
                .map_or_else(|| "level".to_string(), |side| format!("{side} leads"));
            lines.push(format!(
                "home {} - {} away  ({}, {leader})",
                board.home, board.away, board.status
            ));
        }
        ResourceKind::AttendanceRoster => {
            let summary = attendance_summary(payload);
            lines.push(format!(
                "present {}  late {}  absent {}  excused {}  rate {:.0}%",
                summary.present,
                summary.late,
                summary.absent,
                summary.excused,
                summary.rate * 100.0
            ));
        }
        ResourceKind::CoachWorkload => {
            let stats = workload_stats(payload);
            lines.push(format!(
                "{:.1}h over {} completed session(s), {} open",
                stats.total_hours, stats.completed_sessions, stats.open_sessions
            ));
        }
        ResourceKind::UpdateFeed => {
            let items = update_feed(payload);
            if items.is_empty() {
                lines.push("no updates".to_string());
            }
            lines.extend(items.iter().map(|item| {
                format!(
                    "[{}] {}  {}",
                    item.priority.as_str(),
                    item.created_at.format("%Y-%m-%d %H:%M"),
                    item.title
                )
            }));
        }
    }
    lines
}
