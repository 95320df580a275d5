use crate::commands::common::{
    format_state_lines, load_sync_config, offline_client, parse_handle, resource_view,
};
use crate::error::CliError;

pub async fn run_show(handle: &str, as_json: bool, profile: Option<&str>) -> Result<(), CliError> {
    let handle = parse_handle(handle)?;
    let config = load_sync_config(profile)?;
    let (client, _rest) = offline_client(&config)?;
    let state = client.load(&handle).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&resource_view(&state)?)?);
    } else {
        for line in format_state_lines(&state) {
            println!("{line}");
        }
    }

    Ok(())
}
