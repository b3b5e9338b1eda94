use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// What kind of content a model variant accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Text,
    Vision,
}

/// An immutable catalog entry for one backend model variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVariant {
    pub id: String,
    pub display_name: String,
    pub capability: Capability,
}

impl ModelVariant {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        capability: Capability,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            capability,
        }
    }
}

/// Static catalog of model variants plus the mutable active selection.
///
/// The active id is process-wide: new chat sessions bind to whatever
/// value is current at creation time and are never re-bound by a later
/// switch. Writes only come from the model-selection callback handler;
/// everything else takes a single read per session creation.
pub struct ModelRegistry {
    catalog: Vec<ModelVariant>,
    active: RwLock<String>,
}

impl ModelRegistry {
    /// Build the standard Gemini catalog with `gemini-2.5-pro` active.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(
            vec![
                ModelVariant::new("gemini-2.5-pro", "Gemini 2.5 Pro", Capability::Text),
                ModelVariant::new("gemini-2.5-flash", "Gemini 2.5 Flash", Capability::Vision),
                ModelVariant::new(
                    "gemini-2.5-flash-lite",
                    "Gemini 2.5 Flash Lite",
                    Capability::Vision,
                ),
            ],
            "gemini-2.5-pro",
        )
    }

    /// Build a registry from an explicit catalog.
    ///
    /// Panics if the catalog is empty or `default_active` is not in it;
    /// catalogs are static data wired at startup, so this is a
    /// programming error rather than a runtime condition.
    #[must_use]
    pub fn new(catalog: Vec<ModelVariant>, default_active: &str) -> Self {
        assert!(
            catalog.iter().any(|v| v.id == default_active),
            "default active variant {default_active:?} missing from catalog"
        );
        Self {
            catalog,
            active: RwLock::new(default_active.to_string()),
        }
    }

    /// All variants in catalog order.
    pub fn list(&self) -> &[ModelVariant] {
        &self.catalog
    }

    /// Look up a variant by id.
    pub fn get(&self, id: &str) -> Option<&ModelVariant> {
        self.catalog.iter().find(|v| v.id == id)
    }

    /// The currently active variant id.
    pub fn active(&self) -> String {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The currently active variant.
    pub fn active_variant(&self) -> &ModelVariant {
        let active = self.active();
        // The active id is only ever set from the catalog.
        self.catalog
            .iter()
            .find(|v| v.id == active)
            .unwrap_or(&self.catalog[0])
    }

    /// Switch the active variant. Returns `false` (no mutation) when the
    /// id is not in the catalog. Re-selecting the active id succeeds.
    pub fn switch_active(&self, id: &str) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        *active = id.to_string();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        ModelRegistry::standard()
    }

    #[test]
    fn default_active_resolves_to_catalog_entry() {
        let reg = registry();
        let active = reg.active();
        assert!(reg.get(&active).is_some());
        assert_eq!(reg.active_variant().id, active);
    }

    #[test]
    fn switch_to_known_variant_updates_active() {
        let reg = registry();
        assert!(reg.switch_active("gemini-2.5-flash"));
        assert_eq!(reg.active(), "gemini-2.5-flash");
    }

    #[test]
    fn switch_to_unknown_variant_is_rejected_without_mutation() {
        let reg = registry();
        let before = reg.active();
        assert!(!reg.switch_active("gemini-9000-ultra"));
        assert_eq!(reg.active(), before);
    }

    #[test]
    fn reselecting_active_variant_is_a_noop_success() {
        let reg = registry();
        let before = reg.active();
        assert!(reg.switch_active(&before));
        assert_eq!(reg.active(), before);
    }

    #[test]
    fn list_preserves_catalog_order() {
        let reg = registry();
        let ids: Vec<&str> = reg.list().iter().map(|v| v.id.as_str()).collect();
        assert_eq!(
            ids,
            ["gemini-2.5-pro", "gemini-2.5-flash", "gemini-2.5-flash-lite"]
        );
    }

    #[test]
    fn capability_tags_are_exposed() {
        let reg = registry();
        assert_eq!(
            reg.get("gemini-2.5-pro").map(|v| v.capability),
            Some(Capability::Text)
        );
        assert_eq!(
            reg.get("gemini-2.5-flash").map(|v| v.capability),
            Some(Capability::Vision)
        );
    }
}
