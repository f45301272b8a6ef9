//! Platforms command - list, validate and probe adapter definitions

use anyhow::{Context, Result};
use crosspost_adapters::transport::StubTransport;
use crosspost_domain::{AdapterDefinition, Capability, PlatformRegistry};
use std::path::PathBuf;
use std::sync::Arc;

use crate::args::{PlatformsArgs, PlatformsCommands};
use crate::config::AppConfig;
use crate::wiring;

pub async fn execute(args: PlatformsArgs, config_path: Option<PathBuf>) -> Result<()> {
    match args.command {
        PlatformsCommands::List {
            definitions_dir,
            json,
        } => list_platforms(definitions_dir, json, config_path).await,
        PlatformsCommands::Validate { definitions_dir } => {
            validate_platforms(definitions_dir, config_path).await
        }
        PlatformsCommands::Check {
            id,
            definitions_dir,
            json,
        } => check_platform(id, definitions_dir, json, config_path).await,
    }
}

fn capability_names(definition: &AdapterDefinition) -> Vec<&'static str> {
    definition.capabilities.iter().map(Capability::as_str).collect()
}

async fn list_platforms(
    definitions_dir: Option<PathBuf>,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).unwrap_or_default();
    let dir = wiring::definitions_dir(&config, definitions_dir);
    let definitions = wiring::load_valid_definitions(&dir).await?;

    if json {
        let output = serde_json::json!({
            "count": definitions.len(),
            "platforms": definitions.iter().map(|d| serde_json::json!({
                "id": d.id,
                "name": d.display_name,
                "homepage": d.homepage.as_str(),
                "capabilities": capability_names(d),
                "endpoints": d.endpoints.keys().collect::<Vec<_>>(),
                "enabled": config.is_enabled(&d.id),
            })).collect::<Vec<_>>()
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Platforms ({} found)", definitions.len());
        println!("========================");
        println!();

        for def in &definitions {
            println!("ID: {}", def.id);
            println!("  Name: {}", def.display_name);
            println!("  Homepage: {}", def.homepage);
            println!("  Capabilities: {}", capability_names(def).join(", "));
            if !def.hooks.is_empty() {
                let hooks: Vec<_> = def.hooks.iter().map(|h| h.as_str()).collect();
                println!("  Hooks: {}", hooks.join(", "));
            }
            if !config.is_enabled(&def.id) {
                println!("  Disabled in config");
            }
            println!();
        }
    }

    Ok(())
}

async fn validate_platforms(
    definitions_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).unwrap_or_default();
    let dir = wiring::definitions_dir(&config, definitions_dir);

    println!("Validating platform definitions in: {}", dir.display());

    let mut problems = Vec::new();
    let mut definitions = Vec::new();
    for loaded in wiring::load_definitions(&dir).await? {
        match loaded {
            Ok(definition) => definitions.push(definition),
            Err(error) => problems.push(error.to_string()),
        }
    }

    // Binding catches declared hooks that nothing implements
    let (_, failures) = wiring::register(definitions.clone(), Arc::new(StubTransport::new()));
    problems.extend(failures.into_iter().map(|(_, error)| error.to_string()));

    if definitions.is_empty() && problems.is_empty() {
        problems.push(format!("No definitions found in {}", dir.display()));
    }

    if problems.is_empty() {
        println!("✓ Validation passed ({} platforms)", definitions.len());
        return Ok(());
    }

    eprintln!("✗ Validation failed ({} problem(s))", problems.len());
    for problem in &problems {
        eprintln!("  - {}", problem);
    }
    std::process::exit(1);
}

async fn check_platform(
    id: String,
    definitions_dir: Option<PathBuf>,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let dir = wiring::definitions_dir(&config, definitions_dir);
    let registry = wiring::build_registry(&config, &dir).await?;

    let runtime = registry
        .get(&id)
        .with_context(|| format!("Platform not registered: {}", id))?;

    let auth = runtime
        .check_auth()
        .await
        .with_context(|| format!("Auth check failed for {}", id))?;

    if json {
        let output = serde_json::json!({
            "platform": id,
            "authenticated": auth.authenticated,
            "fields": auth.fields,
            "reason": auth.reason,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if auth.authenticated {
        println!("✓ {}: logged in", id);
        for (key, value) in &auth.fields {
            match value {
                serde_json::Value::String(s) => println!("  {}: {}", key, s),
                other => println!("  {}: {}", key, other),
            }
        }
    } else {
        println!(
            "✗ {}: not logged in ({})",
            id,
            auth.reason.as_deref().unwrap_or("no reason given")
        );
    }

    if !auth.authenticated {
        std::process::exit(1);
    }

    Ok(())
}
