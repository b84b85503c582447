//! Scripts known to the VM.

use std::collections::BTreeMap;
use std::fmt;

/// VM-assigned script id. Numeric on the native protocol, a string on WIP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(String);

impl ScriptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as a number, for the native protocol.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl From<i64> for ScriptId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ScriptId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A compiled script.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub id: ScriptId,
    /// File name or URL. Anonymous scripts have none.
    pub name: Option<String>,
    pub line_offset: i64,
    pub column_offset: i64,
    pub line_count: u32,
    /// Source text, when it has been fetched.
    pub source: Option<String>,
}

impl Script {
    pub fn new(id: ScriptId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            line_offset: 0,
            column_offset: 0,
            line_count: 0,
            source: None,
        }
    }
}

/// Scripts reported by `afterCompile`/`scriptParsed` and the initial load.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: BTreeMap<ScriptId, Script>,
    loaded: bool,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a script. Known source text is kept if the new entry
    /// carries none.
    pub fn add(&mut self, mut script: Script) {
        if script.source.is_none() {
            if let Some(existing) = self.scripts.get(&script.id) {
                script.source = existing.source.clone();
            }
        }
        self.scripts.insert(script.id.clone(), script);
    }

    pub fn remove(&mut self, id: &ScriptId) -> Option<Script> {
        self.scripts.remove(id)
    }

    pub fn get(&self, id: &ScriptId) -> Option<&Script> {
        self.scripts.get(id)
    }

    /// Attach fetched source text.
    pub fn set_source(&mut self, id: &ScriptId, source: String) {
        if let Some(script) = self.scripts.get_mut(id) {
            script.source = Some(source);
        }
    }

    /// First script with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<&Script> {
        self.scripts
            .values()
            .find(|s| s.name.as_deref() == Some(name))
    }

    /// All scripts, ordered by id.
    pub fn all(&self) -> Vec<Script> {
        self.scripts.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Whether the full script list has been fetched from the VM.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    /// Forget all scripts, e.g. after a page navigation.
    pub fn reset(&mut self) {
        self.scripts.clear();
        self.loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(id: i64, name: &str) -> Script {
        Script::new(ScriptId::from(id), Some(name.into()))
    }

    #[test]
    fn script_id_conversions() {
        let id = ScriptId::from(17);
        assert_eq!(id.as_str(), "17");
        assert_eq!(id.as_i64(), Some(17));
        assert_eq!(ScriptId::new("abc").as_i64(), None);
    }

    #[test]
    fn add_find_remove() {
        let mut registry = ScriptRegistry::new();
        registry.add(script(1, "a.js"));
        registry.add(script(2, "b.js"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find_by_name("b.js").unwrap().id, ScriptId::from(2));

        assert!(registry.remove(&ScriptId::from(1)).is_some());
        assert!(registry.find_by_name("a.js").is_none());
    }

    #[test]
    fn re_adding_keeps_fetched_source() {
        let mut registry = ScriptRegistry::new();
        registry.add(script(1, "a.js"));
        registry.set_source(&ScriptId::from(1), "var x;".into());
        registry.add(script(1, "a.js"));
        assert_eq!(
            registry.get(&ScriptId::from(1)).unwrap().source.as_deref(),
            Some("var x;")
        );
    }

    #[test]
    fn reset_clears_loaded_flag() {
        let mut registry = ScriptRegistry::new();
        registry.add(script(1, "a.js"));
        registry.mark_loaded();
        assert!(registry.is_loaded());
        registry.reset();
        assert!(!registry.is_loaded());
        assert!(registry.is_empty());
    }

    #[test]
    fn all_is_ordered_by_id() {
        let mut registry = ScriptRegistry::new();
        registry.add(Script::new(ScriptId::new("b"), None));
        registry.add(Script::new(ScriptId::new("a"), None));
        let ids: Vec<_> = registry.all().into_iter().map(|s| s.id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
