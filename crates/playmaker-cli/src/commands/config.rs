use std::env;

use playmaker_core::util::{is_http_url, is_ws_url, normalize_text_option};
use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::config_profiles::{
    default_config_path, CliProfile, CliProfilesConfig, API_URL_ENV, PUSH_URL_ENV,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct EffectiveConfig<'a> {
    profile: &'a str,
    config_path: String,
    sync: &'a playmaker_core::SyncConfig,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            push_url,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            api_base_url,
            push_url,
            no_activate,
        ),
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    api_base_url: Option<String>,
    push_url: Option<String>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged = merge_profile(
        &existing,
        api_base_url.or_else(|| env::var(API_URL_ENV).ok()),
        push_url.or_else(|| env::var(PUSH_URL_ENV).ok()),
    )?;
    *config.profile_mut_or_default(&profile_name) = merged;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let profile = config
        .profile(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    let mut missing_fields = Vec::new();
    if profile.api_base_url.is_none() {
        missing_fields.push("api_base_url");
    }
    if profile.push_url.is_none() {
        missing_fields.push("push_url");
    }
    if missing_fields.is_empty() {
        println!("Profile '{profile_name}' is ready. Try `playmaker watch <handle> --scope <scope>`.");
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();
    let sync = profile.sync_config(env::var(API_URL_ENV).ok(), env::var(PUSH_URL_ENV).ok())?;
    let config_path = default_config_path().map_err(CliError::Config)?;

    let effective = EffectiveConfig {
        profile: &profile_name,
        config_path: config_path.display().to_string(),
        sync: &sync,
    };
    println!("{}", serde_json::to_string_pretty(&effective)?);
    Ok(())
}

/// Explicit values win over the existing profile; URLs are checked per scheme.
pub fn merge_profile(
    existing: &CliProfile,
    api_base_url: Option<String>,
    push_url: Option<String>,
) -> Result<CliProfile, CliError> {
    let api_base_url = normalize_text_option(api_base_url).or_else(|| existing.api_base_url.clone());
    let push_url = normalize_text_option(push_url).or_else(|| existing.push_url.clone());

    if let Some(url) = &api_base_url {
        if !is_http_url(url) {
            return Err(CliError::Config(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }
    }
    if let Some(url) = &push_url {
        if !is_ws_url(url) {
            return Err(CliError::Config(
                "push_url must include ws:// or wss://".to_string(),
            ));
        }
    }

    Ok(CliProfile {
        api_base_url: api_base_url.map(|url| url.trim_end_matches('/').to_string()),
        push_url,
        ..existing.clone()
    })
}
