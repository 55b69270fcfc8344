//! Configuration Plugins: registered interceptors that may rewrite a
//! dictionary in flight, before it reaches the managed service.

use ferrite_core::Properties;

/// An interceptor applied to a configuration dictionary before delivery.
pub trait ConfigurationPlugin: Send + Sync {
    fn modify(&self, pid: &str, properties: Properties) -> Properties;
}

pub(crate) struct RegisteredPlugin {
    pub ranking: i64,
    pub targets: Option<Vec<String>>,
    pub plugin: std::sync::Arc<dyn ConfigurationPlugin>,
}

impl RegisteredPlugin {
    fn applies_to(&self, pid: &str) -> bool {
        match &self.targets {
            Some(targets) => targets.iter().any(|t| t == pid),
            None => true,
        }
    }
}

/// The ordered set of interceptors applied before a dictionary is
/// delivered. `cm.ranking` governs ascending application order;
/// `cm.target` (if present) limits an interceptor to specific PIDs.
#[derive(Default)]
pub struct ConfigurationPluginChain {
    plugins: Vec<RegisteredPlugin>,
}

impl ConfigurationPluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ranking: i64, targets: Option<Vec<String>>, plugin: std::sync::Arc<dyn ConfigurationPlugin>) {
        self.plugins.push(RegisteredPlugin { ranking, targets, plugin });
        self.plugins.sort_by_key(|p| p.ranking);
    }

    pub fn apply(&self, pid: &str, mut properties: Properties) -> Properties {
        for entry in &self.plugins {
            if entry.applies_to(pid) {
                properties = entry.plugin.modify(pid, properties);
            }
        }
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Tag(&'static str);
    impl ConfigurationPlugin for Tag {
        fn modify(&self, _pid: &str, properties: Properties) -> Properties {
            properties.with(self.0, json!(true))
        }
    }

    #[test]
    fn applies_in_ranking_order() {
        let mut chain = ConfigurationPluginChain::new();
        chain.register(10, None, std::sync::Arc::new(Tag("second")));
        chain.register(1, None, std::sync::Arc::new(Tag("first")));
        let result = chain.apply("P", Properties::new());
        assert_eq!(result.get("first"), Some(&json!(true)));
        assert_eq!(result.get("second"), Some(&json!(true)));
    }

    #[test]
    fn target_list_restricts_application() {
        let mut chain = ConfigurationPluginChain::new();
        chain.register(0, Some(vec!["OTHER".to_string()]), std::sync::Arc::new(Tag("tagged")));
        let result = chain.apply("P", Properties::new());
        assert!(result.get("tagged").is_none());
    }
}
