use super::EcosystemDefinition;
use std::sync::Arc;

/// Ordered set of ecosystems; order breaks detection ties
#[derive(Clone)]
pub struct EcosystemRegistry {
    ecosystems: Vec<Arc<dyn EcosystemDefinition>>,
}

impl EcosystemRegistry {
    pub fn new() -> Self {
        Self {
            ecosystems: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::NodeEcosystem));
        registry.register(Arc::new(super::PythonEcosystem));
        registry.register(Arc::new(super::GoEcosystem));
        registry.register(Arc::new(super::RustEcosystem));
        registry.register(Arc::new(super::JavaEcosystem));
        registry.register(Arc::new(super::RubyEcosystem));
        registry.register(Arc::new(super::PhpEcosystem));
        registry.register(Arc::new(super::DotNetEcosystem));
        registry.register(Arc::new(super::StaticSiteEcosystem));
        registry
    }

    pub fn register(&mut self, ecosystem: Arc<dyn EcosystemDefinition>) {
        self.ecosystems.push(ecosystem);
    }

    pub fn all(&self) -> &[Arc<dyn EcosystemDefinition>] {
        &self.ecosystems
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn EcosystemDefinition>> {
        self.ecosystems.iter().find(|e| e.name() == name)
    }
}

impl Default for EcosystemRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
