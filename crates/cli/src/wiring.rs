//! Builds the registry, transport and definitions from configuration

use anyhow::{Context, Result};
use crosspost_adapters::content::BasicContentProcessor;
use crosspost_adapters::definitions::FilesystemDefinitionsRepo;
use crosspost_adapters::hooks::HooksCatalog;
use crosspost_adapters::registry::{InMemoryPlatformRegistry, RegistrationError};
use crosspost_adapters::transport::{ReqwestTransport, StubTransport};
use crosspost_domain::{
    AdapterDefinition, DefinitionError, DefinitionsRepo, PlatformRegistry, Transport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{AppConfig, TransportKind};

/// Definitions directory, with the command-line override taking precedence
pub fn definitions_dir(config: &AppConfig, cli_override: Option<PathBuf>) -> PathBuf {
    cli_override.unwrap_or_else(|| config.general.definitions_dir.clone())
}

fn open_repo(dir: &Path) -> Result<FilesystemDefinitionsRepo> {
    FilesystemDefinitionsRepo::new(dir)
        .with_context(|| format!("Failed to open definitions directory: {}", dir.display()))
}

/// Every definition file's load result, in filename order
pub async fn load_definitions(dir: &Path) -> Result<Vec<Result<AdapterDefinition, DefinitionError>>> {
    Ok(open_repo(dir)?.load_all().await)
}

/// Valid definitions only; invalid ones are logged and skipped
pub async fn load_valid_definitions(dir: &Path) -> Result<Vec<AdapterDefinition>> {
    Ok(open_repo(dir)?.load().await)
}

/// Transport selected by `general.transport`, with per-platform cookies
pub fn build_transport(config: &AppConfig, definitions: &[AdapterDefinition]) -> Result<Arc<dyn Transport>> {
    match config.general.transport {
        TransportKind::Stub => {
            tracing::info!("Using stub transport; nothing leaves this machine");
            Ok(Arc::new(StubTransport::new()))
        }
        TransportKind::Http => {
            let mut transport = ReqwestTransport::new(config.request_timeout())
                .context("Failed to build HTTP client")?;

            for definition in definitions {
                let platform = config.platform(&definition.id);
                let Some(cookie) = platform.cookie() else {
                    continue;
                };
                let domain = platform
                    .cookie_domain
                    .clone()
                    .or_else(|| definition.homepage.host_str().map(str::to_string));
                match domain {
                    Some(domain) => {
                        tracing::debug!(platform = %definition.id, domain = %domain, "Attached session cookie");
                        transport = transport.with_cookie(domain, cookie);
                    }
                    None => {
                        tracing::warn!(platform = %definition.id, "No cookie domain; session cookie ignored")
                    }
                }
            }

            Ok(Arc::new(transport))
        }
    }
}

/// Bind definitions to runtimes and register them
pub fn register(
    definitions: Vec<AdapterDefinition>,
    transport: Arc<dyn Transport>,
) -> (Arc<InMemoryPlatformRegistry>, Vec<(String, RegistrationError)>) {
    let registry = InMemoryPlatformRegistry::new();
    let failures = registry.register_definitions(
        definitions,
        transport,
        &HooksCatalog::new(),
        Arc::new(BasicContentProcessor::new()),
    );
    (Arc::new(registry), failures)
}

/// Load, filter to enabled platforms, and register everything
pub async fn build_registry(config: &AppConfig, dir: &Path) -> Result<Arc<InMemoryPlatformRegistry>> {
    let definitions: Vec<_> = load_valid_definitions(dir)
        .await?
        .into_iter()
        .filter(|d| {
            let enabled = config.is_enabled(&d.id);
            if !enabled {
                tracing::debug!(platform = %d.id, "Platform disabled in config");
            }
            enabled
        })
        .collect();

    let transport = build_transport(config, &definitions)?;
    let (registry, _failures) = register(definitions, transport);
    tracing::info!(platforms = registry.list_registered_ids().len(), "Platforms registered");

    Ok(registry)
}
