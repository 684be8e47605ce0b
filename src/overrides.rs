//! Keyword override: classify by configured keywords before any network call

use crate::categories::CategoryTable;
use crate::models::{Analysis, Category, MailMessage};

/// A keyword hit that decides the category without the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideMatch {
    /// Name of the category whose keyword matched
    pub category: String,
    /// The keyword as configured
    pub keyword: String,
}

impl OverrideMatch {
    /// URGENT_P0 hits become the literal Emergency category
    pub fn resolved_category(&self) -> Category {
        match Category::parse(&self.category) {
            Category::UrgentP0 => Category::Emergency,
            other => other,
        }
    }

    pub fn into_analysis(self) -> Analysis {
        let category = self.resolved_category();
        if category == Category::Emergency {
            return Analysis {
                category,
                summary: format!(
                    "Auto-flagged as Emergency due to keyword \"{}\" detected in subject/snippet.",
                    self.keyword
                ),
                suggested_action: "Respond immediately, this is a P0 incident.".to_string(),
            };
        }

        Analysis {
            summary: format!(
                "Auto-classified as {} due to keyword \"{}\" detected in subject/snippet.",
                category, self.keyword
            ),
            suggested_action: format!("Handle as {}.", category),
            category,
        }
    }
}

/// Matches subject + snippet against every category's keywords
pub struct KeywordOverride {
    /// (category name, [(keyword as configured, lowercased keyword)]) in priority order
    rules: Vec<(String, Vec<(String, String)>)>,
}

impl KeywordOverride {
    pub fn new(table: &CategoryTable) -> Self {
        let rules = table
            .iter()
            .map(|category| {
                let keywords = category
                    .keywords
                    .iter()
                    .map(|k| (k.clone(), k.to_lowercase()))
                    .collect();
                (category.name.clone(), keywords)
            })
            .collect();
        Self { rules }
    }

    /// First (category, keyword) hit, categories by ascending priority then keywords in order
    pub fn check(&self, subject: &str, snippet: &str) -> Option<OverrideMatch> {
        let search_text = format!("{} {}", subject, snippet).to_lowercase();

        self.rules.iter().find_map(|(category, keywords)| {
            keywords
                .iter()
                .find(|(_, lowered)| search_text.contains(lowered.as_str()))
                .map(|(keyword, _)| OverrideMatch {
                    category: category.clone(),
                    keyword: keyword.clone(),
                })
        })
    }

    pub fn check_message(&self, message: &MailMessage) -> Option<OverrideMatch> {
        self.check(&message.subject, &message.snippet)
    }
}
