use playmaker_core::projection::Side;
use playmaker_core::{Delta, ResourceHandle, RestMutation};
use serde_json::json;

use crate::commands::common::{format_state_lines, load_sync_config, offline_client};
use crate::error::CliError;

pub async fn run_score(
    match_id: &str,
    side: Side,
    points: i64,
    profile: Option<&str>,
) -> Result<(), CliError> {
    if points == 0 {
        return Err(CliError::Config("--points must not be zero".to_string()));
    }
    let handle = ResourceHandle::match_score(match_id)?;
    let config = load_sync_config(profile)?;
    let (client, rest) = offline_client(&config)?;
    client.load(&handle).await?;

    let (delta, request) = score_mutation(side, points);
    let version = client
        .mutate_rest(&rest, &handle, delta, request)
        .await
        .into_result()
        .map_err(CliError::RolledBack)?;

    println!("Recorded {points:+} for {side} at version {version}");
    if let Some(state) = client.state(&handle) {
        for line in format_state_lines(&state) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Optimistic delta and REST request for a score change
pub fn score_mutation(side: Side, points: i64) -> (Delta, RestMutation) {
    (
        Delta::increment([side.score_field()], points),
        RestMutation::post("score", json!({ "side": side, "points": points })),
    )
}
