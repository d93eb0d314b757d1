use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::Classifier;

/// Registry of classifier backends, keyed by `Classifier::name`.
pub struct ClassifierRegistry {
    backends: HashMap<String, Box<dyn Classifier>>,
    default_name: Option<String>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<C: Classifier + 'static>(&mut self, backend: C) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("classifier '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Classifier + 'static)> {
        self.backends.get_mut(name).map(|backend| backend.as_mut())
    }

    pub fn default_mut(&mut self) -> Option<&mut (dyn Classifier + 'static)> {
        let name = self.default_name.clone()?;
        self.get_mut(&name)
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove and return the default backend, for handing to an `Inspector`.
    pub fn take_default(&mut self) -> Result<Box<dyn Classifier>> {
        let name = self
            .default_name
            .take()
            .ok_or_else(|| anyhow!("no classifier registered"))?;
        self.backends
            .remove(&name)
            .ok_or_else(|| anyhow!("classifier '{}' not registered", name))
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}
