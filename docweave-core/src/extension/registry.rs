use super::Extension;
use std::collections::HashMap;
use tracing::debug;

/// Ordered list of descriptors with lookup by name.
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
    by_name: HashMap<String, usize>,
}

impl ExtensionRegistry {
    pub fn new(extensions: Vec<Box<dyn Extension>>) -> Self {
        let mut by_name = HashMap::new();
        for (i, ext) in extensions.iter().enumerate() {
            if by_name.insert(ext.name().to_string(), i).is_some() {
                debug!(name = ext.name(), "Later extension shadows an earlier one");
            }
        }
        Self {
            extensions,
            by_name,
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Extension> {
        self.by_name
            .get(name)
            .map(|&i| &*self.extensions[i] as &dyn Extension)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Extension> {
        self.extensions.iter().map(|e| &**e as &dyn Extension)
    }

    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub(crate) fn as_slice(&self) -> &[Box<dyn Extension>] {
        &self.extensions
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
