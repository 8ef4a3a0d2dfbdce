//! Feature-flag lookup behind a narrow interface.
//!
//! A flag file is a flat JSON object of name → bool or string. Without one,
//! every flag reads as enabled.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tokio::fs;
use tracing::warn;

pub struct FeatureFlags {
    flags: HashMap<String, Value>,
}

impl FeatureFlags {
    /// No backing store: everything is enabled, variants are absent.
    pub fn none() -> Self {
        Self {
            flags: HashMap::new(),
        }
    }

    pub async fn from_file(path: &Path) -> Self {
        match fs::read_to_string(path).await {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(flags) => Self { flags },
                Err(e) => {
                    warn!("bad flag file {}: {e}", path.display());
                    Self::none()
                }
            },
            Err(_) => Self::none(),
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        match self.flags.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn get_variant(&self, name: &str) -> Option<String> {
        match self.flags.get(name) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_flags_default_to_enabled() {
        let flags = FeatureFlags::none();
        assert!(flags.is_enabled("anything"));
        assert!(flags.get_variant("anything").is_none());
    }

    #[test]
    fn booleans_and_variants_resolve() {
        let flags = FeatureFlags {
            flags: serde_json::from_str(
                r#"{"secbot-voice": false, "recovery": "vocal", "empty": ""}"#,
            )
            .unwrap(),
        };
        assert!(!flags.is_enabled("secbot-voice"));
        assert!(flags.is_enabled("recovery"));
        assert!(!flags.is_enabled("empty"));
        assert_eq!(flags.get_variant("recovery").as_deref(), Some("vocal"));
        assert!(flags.get_variant("secbot-voice").is_none());
    }
}
