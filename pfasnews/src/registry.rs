use common::ScopesConfig;
use std::collections::BTreeMap;

/// Scope used when a request does not name one.
pub const DEFAULT_SCOPE: &str = "global";

/// Static mapping from scope name to its ordered feed sources.
///
/// Built once at start-up and shared read-only for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct FeedRegistry {
    scopes: BTreeMap<String, Vec<String>>,
}

impl FeedRegistry {
    pub fn new(scopes: BTreeMap<String, Vec<String>>) -> Self {
        Self { scopes }
    }

    pub fn from_config(scopes: &ScopesConfig) -> Self {
        Self::new(scopes.clone())
    }

    /// Feed URLs for `scope` in registry order, or `None` for an unknown scope.
    pub fn sources_for(&self, scope: &str) -> Option<&[String]> {
        self.scopes.get(scope).map(Vec::as_slice)
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.contains_key(scope)
    }

    /// Valid scope names, sorted.
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes.keys().map(String::as_str).collect()
    }

    /// Message returned to clients that ask for a scope outside the registry.
    pub fn invalid_scope_message(&self) -> String {
        format!("Invalid scope. Use: {}", human_list(&self.scopes()))
    }
}

/// "a", "a or b", "a, b, or c"
fn human_list(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{} or {}", first, second),
        [init @ .., last] => format!("{}, or {}", init.join(", "), last),
    }
}
