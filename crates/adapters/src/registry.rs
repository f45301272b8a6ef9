//! In-memory platform registry

use crosspost_domain::{
    AdapterDefinition, AdapterRuntime, ContentProcessor, DefinitionError, PlatformRegistry,
    RegistryError, Transport,
};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::hooks::HooksCatalog;

/// Why a definition could not be registered
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Process-wide platform id -> runtime map
#[derive(Default)]
pub struct InMemoryPlatformRegistry {
    runtimes: RwLock<BTreeMap<String, Arc<AdapterRuntime>>>,
}

impl InMemoryPlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind and register every definition, collecting failures per platform
    ///
    /// Hooks are resolved from `hooks`; a definition whose declared hooks
    /// cannot be satisfied is skipped.
    pub fn register_definitions(
        &self,
        definitions: Vec<AdapterDefinition>,
        transport: Arc<dyn Transport>,
        hooks: &HooksCatalog,
        content: Arc<dyn ContentProcessor>,
    ) -> Vec<(String, RegistrationError)> {
        let mut failures = Vec::new();

        for definition in definitions {
            let id = definition.id.clone();
            let platform_hooks = hooks.resolve(&definition);
            let registered = AdapterRuntime::new(
                definition,
                Arc::clone(&transport),
                platform_hooks,
                Arc::clone(&content),
            )
            .map_err(RegistrationError::from)
            .and_then(|runtime| self.register(runtime).map_err(RegistrationError::from));

            match registered {
                Ok(()) => tracing::debug!(platform = %id, "Registered platform"),
                Err(error) => {
                    tracing::warn!(platform = %id, error = %error, "Skipping platform");
                    failures.push((id, error));
                }
            }
        }

        failures
    }
}

impl PlatformRegistry for InMemoryPlatformRegistry {
    fn register(&self, runtime: AdapterRuntime) -> Result<(), RegistryError> {
        let mut runtimes = self.runtimes.write().unwrap_or_else(PoisonError::into_inner);
        if runtimes.contains_key(runtime.id()) {
            return Err(RegistryError::DuplicatePlatform(runtime.id().to_string()));
        }
        runtimes.insert(runtime.id().to_string(), Arc::new(runtime));
        Ok(())
    }

    fn unregister(&self, platform_id: &str) -> bool {
        self.runtimes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(platform_id)
            .is_some()
    }

    fn get(&self, platform_id: &str) -> Option<Arc<AdapterRuntime>> {
        self.runtimes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(platform_id)
            .cloned()
    }

    fn list_registered_ids(&self) -> Vec<String> {
        self.runtimes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::BasicContentProcessor;
    use crate::stub::StubTransport;
    use crosspost_domain::{AdapterSpec, HookKind};

    fn definition(id: &str, hooks: &[&str]) -> AdapterDefinition {
        let spec: AdapterSpec = serde_json::from_value(serde_json::json!({
            "id": id,
            "name": id,
            "homepage": format!("https://{id}.test"),
            "auth": { "url": format!("https://{id}.test/me") },
            "endpoints": { "publish": { "url": format!("https://{id}.test/p"), "method": "POST" } },
            "hooks": hooks,
        }))
        .unwrap();
        AdapterDefinition::try_from(spec).unwrap()
    }

    fn register_all(registry: &InMemoryPlatformRegistry, definitions: Vec<AdapterDefinition>) -> Vec<(String, RegistrationError)> {
        registry.register_definitions(
            definitions,
            Arc::new(StubTransport::new()),
            &HooksCatalog::default(),
            Arc::new(BasicContentProcessor::new()),
        )
    }

    #[test]
    fn test_register_and_list_sorted() {
        let registry = InMemoryPlatformRegistry::new();
        let failures = register_all(&registry, vec![definition("zeta", &[]), definition("alpha", &[])]);

        assert!(failures.is_empty());
        assert_eq!(registry.list_registered_ids(), vec!["alpha", "zeta"]);
        assert_eq!(registry.get("zeta").unwrap().id(), "zeta");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = InMemoryPlatformRegistry::new();
        let failures = register_all(&registry, vec![definition("alpha", &[]), definition("alpha", &[])]);

        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0].1,
            RegistrationError::Registry(RegistryError::DuplicatePlatform(_))
        ));
    }

    #[test]
    fn test_unsatisfied_hook_is_skipped() {
        let registry = InMemoryPlatformRegistry::new();
        let failures = register_all(
            &registry,
            vec![definition("alpha", &["before_request"]), definition("beta", &["prepare_body"])],
        );

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "alpha");
        assert!(matches!(
            failures[0].1,
            RegistrationError::Definition(DefinitionError::MissingHook { hook: HookKind::BeforeRequest, .. })
        ));
        assert_eq!(registry.list_registered_ids(), vec!["beta"]);
    }

    #[test]
    fn test_unregister() {
        let registry = InMemoryPlatformRegistry::new();
        register_all(&registry, vec![definition("alpha", &[])]);

        assert!(registry.unregister("alpha"));
        assert!(!registry.unregister("alpha"));
        assert!(registry.list_registered_ids().is_empty());
    }
}
