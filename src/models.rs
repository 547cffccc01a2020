use serde::Serialize;

pub const MODEL_ID: &str = "MBZUAI-IFM/K2-Think";
pub const MODEL_OWNER: &str = "MBZUAI-IFM";
pub const MODEL_ALIASES: &[&str] = &["K2-Think", "k2think", "k2-think", "k2"];

/// The single model this proxy serves, plus the names clients may use for it.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    pub id: String,
    pub owner: String,
    pub aliases: Vec<String>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            id: MODEL_ID.to_string(),
            owner: MODEL_OWNER.to_string(),
            aliases: MODEL_ALIASES.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelObject {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: String,
    pub root: String,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelObject>,
}

impl ModelCatalog {
    /// Case-insensitive alias match after trimming. The canonical id itself is not an alias.
    pub fn is_alias(&self, name: &str) -> bool {
        let needle = name.trim().to_lowercase();
        self.aliases.iter().any(|alias| alias.to_lowercase() == needle)
    }

    /// Returns the canonical id when `model` names an alias, `None` when it should pass through.
    pub fn canonicalize(&self, model: &str) -> Option<&str> {
        if model == self.id {
            return None;
        }
        self.is_alias(model).then_some(self.id.as_str())
    }

    pub fn matches(&self, name: &str) -> bool {
        name == self.id || self.is_alias(name)
    }

    pub fn model_object(&self, created: i64) -> ModelObject {
        ModelObject {
            id: self.id.clone(),
            object: "model",
            created,
            owned_by: self.owner.clone(),
            root: self.id.clone(),
            parent: None,
        }
    }

    pub fn list(&self, created: i64) -> ModelList {
        ModelList {
            object: "list",
            data: vec![self.model_object(created)],
        }
    }

    pub fn lookup(&self, name: &str, created: i64) -> Option<ModelObject> {
        self.matches(name).then(|| self.model_object(created))
    }
}

#[cfg(test)]
mod tests {
    use super::{MODEL_ID, ModelCatalog};

    #[test]
    fn alias_match_ignores_case_and_whitespace() {
        let catalog = ModelCatalog::default();
        assert_eq!(catalog.canonicalize(" K2-THINK "), Some(MODEL_ID));
        assert_eq!(catalog.canonicalize("k2"), Some(MODEL_ID));
        assert_eq!(catalog.canonicalize("K2Think"), Some(MODEL_ID));
    }

    #[test]
    fn unknown_and_canonical_models_pass_through() {
        let catalog = ModelCatalog::default();
        assert_eq!(catalog.canonicalize("gpt-4o"), None);
        assert_eq!(catalog.canonicalize(MODEL_ID), None);
        assert_eq!(catalog.canonicalize("k2 think"), None);
    }

    #[test]
    fn lookup_returns_canonical_metadata() {
        let catalog = ModelCatalog::default();
        let model = catalog.lookup("K2", 1_700_000_000).expect("alias resolves");
        assert_eq!(model.id, MODEL_ID);
        assert_eq!(model.root, MODEL_ID);
        assert_eq!(model.owned_by, "MBZUAI-IFM");
        assert_eq!(model.created, 1_700_000_000);
        assert!(model.parent.is_none());
        assert!(catalog.lookup(MODEL_ID, 0).is_some());
        assert!(catalog.lookup("llama-3", 0).is_none());
    }

    #[test]
    fn parent_serializes_as_null() {
        let catalog = ModelCatalog::default();
        let v = serde_json::to_value(catalog.list(42)).unwrap();
        assert_eq!(v["object"], "list");
        assert_eq!(v["data"][0]["object"], "model");
        assert!(v["data"][0]["parent"].is_null());
    }
}
