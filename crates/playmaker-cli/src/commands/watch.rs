use playmaker_core::{ChangeCause, Scope, SyncClient};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{format_state_lines, load_sync_config, parse_handle};
use crate::error::CliError;

pub async fn run_watch(handle: &str, scope: &str, profile: Option<&str>) -> Result<(), CliError> {
    let handle = parse_handle(handle)?;
    let scope: Scope = scope.parse()?;
    let config = load_sync_config(profile)?;
    if config.api_base_url.is_none() {
        return Err(CliError::ApiNotConfigured);
    }
    if config.push_url.is_none() {
        return Err(CliError::PushNotConfigured);
    }

    let live = SyncClient::connect(&config)?;
    let client = &live.client;
    let mut changes = client.changes();
    let subscription = client.subscribe(scope.clone(), [handle.clone()]).await;
    println!("Watching {handle} on {scope} (Ctrl-C to stop)");
    if let Some(state) = client.state(&handle) {
        print_state(&state, None);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => match change {
                Ok(change) if change.handle == handle => {
                    if let Some(state) = client.state(&handle) {
                        print_state(&state, Some(change.cause));
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {skipped} change notification(s); re-reading");
                    if let Some(state) = client.state(&handle) {
                        print_state(&state, None);
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    client.unsubscribe(subscription).await;
    live.shutdown();
    Ok(())
}

fn print_state(state: &playmaker_core::ResourceState, cause: Option<ChangeCause>) {
    if let Some(cause) = cause {
        println!("-- {}", describe_cause(cause));
    }
    for line in format_state_lines(state) {
        println!("{line}");
    }
}

pub const fn describe_cause(cause: ChangeCause) -> &'static str {
    match cause {
        ChangeCause::Optimistic => "local change pending",
        ChangeCause::Committed => "change confirmed",
        ChangeCause::RolledBack => "change rolled back",
        ChangeCause::Pushed => "live update",
        ChangeCause::Reconciled => "resynced from server",
        ChangeCause::MarkedStale => "resync failed; data may be out of date",
    }
}
