//! Bank identity → parser mapping, built once at start-up and read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use tally_core::RegistryError;

use crate::parsers::{
    BankParser, BanorteParser, BbvaParser, HsbcParser, SantanderParser, ScotiabankParser,
    VantageParser,
};

#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn BankParser>>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("banks", &self.available_banks())
            .finish()
    }
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities are case-insensitive; registering one twice is an error.
    pub fn register(&mut self, parser: Arc<dyn BankParser>) -> Result<(), RegistryError> {
        let key = parser.bank().to_uppercase();
        if self.parsers.contains_key(&key) {
            return Err(RegistryError::Duplicate { bank: parser.bank().to_string() });
        }
        self.parsers.insert(key, parser);
        Ok(())
    }

    pub fn get(&self, bank: &str) -> Option<&dyn BankParser> {
        self.parsers.get(&bank.to_uppercase()).map(|p| p.as_ref())
    }

    /// Shared handle, for callers that move the parser into another task.
    pub fn get_shared(&self, bank: &str) -> Option<Arc<dyn BankParser>> {
        self.parsers.get(&bank.to_uppercase()).cloned()
    }

    pub fn available_banks(&self) -> Vec<String> {
        let mut banks: Vec<String> = self.parsers.values().map(|p| p.bank().to_string()).collect();
        banks.sort();
        banks
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

/// Every shipped parser.
pub fn default_registry() -> Result<ParserRegistry, RegistryError> {
    let mut registry = ParserRegistry::new();
    registry.register(Arc::new(BbvaParser::new().map_err(|e| RegistryError::pattern("BBVA", e))?))?;
    registry.register(Arc::new(BanorteParser::new().map_err(|e| RegistryError::pattern("BANORTE", e))?))?;
    registry.register(Arc::new(HsbcParser::new().map_err(|e| RegistryError::pattern("HSBC", e))?))?;
    registry.register(Arc::new(
        SantanderParser::new().map_err(|e| RegistryError::pattern("SANTANDER", e))?,
    ))?;
    registry.register(Arc::new(
        ScotiabankParser::new().map_err(|e| RegistryError::pattern("SCOTIABANK", e))?,
    ))?;
    registry.register(Arc::new(
        VantageParser::new().map_err(|e| RegistryError::pattern("VANTAGE_BANK", e))?,
    ))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ParseStrategy;

    #[test]
    fn shipped_parsers() {
        let registry = default_registry().unwrap();
        assert_eq!(
            registry.available_banks(),
            vec!["BANORTE", "BBVA", "HSBC", "SANTANDER", "SCOTIABANK", "VANTAGE_BANK"]
        );
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.get("hsbc").map(|p| p.strategy()), Some(ParseStrategy::Position));
        assert!(registry.get("Santander").is_some_and(|p| !p.requires_words()));
        assert!(registry.get("CITIBANAMEX").is_none());
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut registry = default_registry().unwrap();
        let err = registry.register(Arc::new(BbvaParser::new().unwrap())).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate { bank: "BBVA".into() });
    }
}
