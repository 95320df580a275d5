use playmaker_core::projection::AttendanceMark;
use playmaker_core::util::normalize_text_option;
use playmaker_core::{Delta, ResourceHandle, RestMutation};
use serde_json::json;

use crate::commands::common::{format_state_lines, load_sync_config, offline_client};
use crate::error::CliError;

pub async fn run_attend(
    session_id: &str,
    player_id: &str,
    mark: AttendanceMark,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let handle = ResourceHandle::attendance_roster(session_id)?;
    let (delta, request) = attendance_mutation(player_id, mark)?;
    let config = load_sync_config(profile)?;
    let (client, rest) = offline_client(&config)?;
    client.load(&handle).await?;

    let version = client
        .mutate_rest(&rest, &handle, delta, request)
        .await
        .into_result()
        .map_err(CliError::RolledBack)?;

    println!(
        "Marked {} {} at version {version}",
        player_id.trim(),
        mark.as_str()
    );
    if let Some(state) = client.state(&handle) {
        for line in format_state_lines(&state) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Optimistic delta and REST request for one attendance mark
pub fn attendance_mutation(
    player_id: &str,
    mark: AttendanceMark,
) -> Result<(Delta, RestMutation), CliError> {
    let player_id = normalize_text_option(Some(player_id.to_string()))
        .ok_or_else(|| CliError::Config("player id must not be empty".to_string()))?;
    Ok((
        Delta::merge(json!({ "attendance": { player_id.clone(): mark } })),
        RestMutation::put(
            "attendance",
            json!({ "player_id": player_id, "mark": mark }),
        ),
    ))
}
