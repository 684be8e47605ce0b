//! Category configuration: the static table every other component reads

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, TriageError};
use crate::models::Category;

/// Built-in table, also shipped as `filter_config.json`
const BUILTIN_CATEGORIES: &str = include_str!("../filter_config.json");

/// One triage category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDefinition {
    pub name: String,
    /// Lower is checked first
    pub priority: i32,
    pub intent: String,
    /// Case-insensitive substrings, in configured order
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CategoryFile {
    categories: HashMap<String, CategoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CategoryEntry {
    priority: i32,
    intent: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Immutable category table, sorted by ascending priority
#[derive(Debug, Clone)]
pub struct CategoryTable {
    categories: Vec<CategoryDefinition>,
}

impl CategoryTable {
    /// Build a table from definitions; sorts by priority, then name
    pub fn new(mut categories: Vec<CategoryDefinition>) -> Result<Self> {
        categories.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        let table = Self { categories };
        table.validate()?;
        Ok(table)
    }

    /// The table shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATEGORIES)
    }

    /// Parse `{"categories": {NAME: {priority, intent, keywords}}}`
    pub fn from_json(content: &str) -> Result<Self> {
        let file: CategoryFile = serde_json::from_str(content).map_err(|e| {
            TriageError::ConfigError(format!("Failed to parse category configuration: {}", e))
        })?;

        let categories = file
            .categories
            .into_iter()
            .map(|(name, entry)| CategoryDefinition {
                name,
                priority: entry.priority,
                intent: entry.intent,
                keywords: entry.keywords,
            })
            .collect();

        Self::new(categories)
    }

    /// Load the table from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            TriageError::ConfigError(format!("Failed to read category file {:?}: {}", path, e))
        })?;
        let table = Self::from_json(&content)?;
        tracing::info!("Loaded {} categories from {:?}", table.len(), path);
        Ok(table)
    }

    /// Load from `path` if given, otherwise the built-in table
    pub async fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path).await,
            None => Self::builtin(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(TriageError::ConfigError(
                "category configuration must define at least one category".to_string(),
            ));
        }

        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(TriageError::ConfigError(
                    "category names cannot be empty".to_string(),
                ));
            }
            if category.name.eq_ignore_ascii_case(Category::EMERGENCY) {
                return Err(TriageError::ConfigError(format!(
                    "'{}' is reserved for keyword overrides",
                    Category::EMERGENCY
                )));
            }
            // An empty keyword is a substring of everything
            if category.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(TriageError::ConfigError(format!(
                    "category '{}' has an empty keyword",
                    category.name
                )));
            }
        }

        Ok(())
    }

    /// Categories in ascending priority order
    pub fn iter(&self) -> impl Iterator<Item = &CategoryDefinition> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Case-insensitive lookup by name
    pub fn get(&self, name: &str) -> Option<&CategoryDefinition> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Intent text for a resolved category; the Emergency override reads URGENT_P0's
    pub fn intent_for(&self, category: &Category) -> Option<&str> {
        let name = match category {
            Category::Emergency => Category::URGENT_P0,
            other => other.as_str(),
        };
        self.get(name).map(|c| c.intent.as_str())
    }

    pub fn names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    /// Category reference block injected into the classification prompt
    pub fn guide(&self) -> String {
        self.categories
            .iter()
            .map(|c| {
                format!(
                    "- {} (priority {}): {}\n  Signal keywords: {}",
                    c.name,
                    c.priority,
                    c.intent,
                    c.keywords.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn definition(name: &str, priority: i32, keywords: &[&str]) -> CategoryDefinition {
        CategoryDefinition {
            name: name.to_string(),
            priority,
            intent: format!("{} intent", name),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn test_builtin_table_is_valid_and_sorted() {
        let table = CategoryTable::builtin().unwrap();
        assert_eq!(table.len(), 5);
        let priorities: Vec<i32> = table.iter().map(|c| c.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
        assert_eq!(table.names()[0], "URGENT_P0");
        assert!(table.get("urgent_p0").unwrap().keywords.contains(&"critical".to_string()));
    }

    #[test]
    fn test_sorts_by_priority_then_name() {
        let table = CategoryTable::new(vec![
            definition("B", 2, &["b"]),
            definition("Z", 1, &["z"]),
            definition("A", 2, &["a"]),
        ])
        .unwrap();
        assert_eq!(table.names(), vec!["Z", "A", "B"]);
    }

    #[test]
    fn test_rejects_empty_table() {
        let result = CategoryTable::new(vec![]);
        assert!(result.unwrap_err().to_string().contains("at least one category"));
    }

    #[test]
    fn test_rejects_empty_keyword() {
        let result = CategoryTable::new(vec![definition("LOW_SIGNAL", 5, &["digest", " "])]);
        assert!(result.unwrap_err().to_string().contains("empty keyword"));
    }

    #[test]
    fn test_rejects_reserved_emergency_name() {
        let result = CategoryTable::new(vec![definition("emergency", 0, &["fire"])]);
        assert!(result.unwrap_err().to_string().contains("reserved"));
    }

    #[test]
    fn test_from_json_invalid() {
        let result = CategoryTable::from_json("{\"categories\": [1, 2]}");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse category configuration"));
    }

    #[test]
    fn test_guide_lists_every_category() {
        let table = CategoryTable::new(vec![
            definition("URGENT_P0", 1, &["critical", "outage"]),
            definition("LOW_SIGNAL", 5, &["newsletter"]),
        ])
        .unwrap();
        let guide = table.guide();
        assert!(guide.contains("- URGENT_P0 (priority 1): URGENT_P0 intent"));
        assert!(guide.contains("Signal keywords: critical, outage"));
        assert!(guide.find("URGENT_P0").unwrap() < guide.find("LOW_SIGNAL").unwrap());
    }

    #[test]
    fn test_emergency_intent_reads_urgent_p0() {
        let table = CategoryTable::new(vec![definition("URGENT_P0", 1, &["critical"])]).unwrap();
        assert_eq!(table.intent_for(&Category::Emergency), Some("URGENT_P0 intent"));
        assert_eq!(table.intent_for(&Category::CalendarSync), None);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let content = r#"{
            "categories": {
                "URGENT_P0": { "priority": 1, "intent": "Fires", "keywords": ["CRITICAL"] },
                "LOW_SIGNAL": { "priority": 9, "intent": "Noise" }
            }
        }"#;
        tokio::fs::write(temp_file.path(), content).await.unwrap();

        let table = CategoryTable::load(temp_file.path()).await.unwrap();
        assert_eq!(table.names(), vec!["URGENT_P0", "LOW_SIGNAL"]);
        assert!(table.get("LOW_SIGNAL").unwrap().keywords.is_empty());
    }

    #[tokio::test]
    async fn test_load_or_builtin_without_path() {
        let table = CategoryTable::load_or_builtin(None).await.unwrap();
        assert!(table.get("CALENDAR_SYNC").is_some());
    }
}
