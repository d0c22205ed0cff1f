use std::collections::BTreeMap;

/// Key/value backend the persisted tunnel settings are written through.
pub trait ConfigStore {
    fn get(&self, section: &str, key: &str) -> Option<String>;
    /// `None` removes the key.
    fn set(&mut self, section: &str, key: &str, value: Option<&str>);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<(String, String), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.entries
            .get(&(section.to_string(), key.to_string()))
            .cloned()
    }
    fn set(&mut self, section: &str, key: &str, value: Option<&str>) {
        let k = (section.to_string(), key.to_string());
        match value {
            Some(v) => {
                self.entries.insert(k, v.to_string());
            }
            None => {
                self.entries.remove(&k);
            }
        }
    }
}
