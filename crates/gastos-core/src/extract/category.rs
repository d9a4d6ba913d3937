//! Keyword-based category classification

use tracing::debug;

use crate::config::CategoryRule;
use crate::models::{fold_text, Category, FieldValue};

/// Confidence added per distinct matched keyword
const CONFIDENCE_PER_KEYWORD: i32 = 30;
const MAX_CONFIDENCE: i32 = 85;

/// Classifies text against a keyword table
///
/// Keywords are matched as substrings of the accent-folded, lowercased text.
/// The rule with the most distinct matches wins; ties go to the rule defined
/// first. The fallback category never matches by keyword.
#[derive(Debug, Clone)]
pub struct CategoryExtractor {
    rules: Vec<(Category, Vec<String>)>,
}

impl CategoryExtractor {
    pub fn new(rules: &[CategoryRule]) -> Self {
        let rules = rules
            .iter()
            .filter(|rule| rule.name != Category::Otros && !rule.keywords.is_empty())
            .map(|rule| {
                let keywords: Vec<String> = rule
                    .keywords
                    .iter()
                    .map(|k| fold_text(k.trim()))
                    .filter(|k| !k.is_empty())
                    .collect();
                (rule.name, keywords)
            })
            .collect();
        Self { rules }
    }

    pub fn extract(&self, text: &str, title: &str) -> FieldValue<Category> {
        let haystack = fold_text(&format!("{}\n{}", text, title));

        let mut best: Option<(Category, usize)> = None;
        for (category, keywords) in &self.rules {
            let mut matched: Vec<&str> = keywords
                .iter()
                .map(String::as_str)
                .filter(|k| haystack.contains(k))
                .collect();
            matched.sort_unstable();
            matched.dedup();

            let count = matched.len();
            if count > 0 && best.map_or(true, |(_, n)| count > n) {
                best = Some((*category, count));
            }
        }

        match best {
            Some((category, count)) => {
                let confidence = (CONFIDENCE_PER_KEYWORD * count as i32).min(MAX_CONFIDENCE);
                debug!(category = %category, matches = count, confidence, "Category found");
                FieldValue::new(category, confidence)
            }
            None => FieldValue::category_not_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_categories;

    fn extractor() -> CategoryExtractor {
        CategoryExtractor::new(&default_categories())
    }

    #[test]
    fn test_supermarket_is_food() {
        // supermerc, mercado, dia
        let category = extractor().extract("SUPERMERCADOS DIA\nTOTAL 29,86", "GRUPO DIA");
        assert_eq!(category.value, Category::Comida);
        assert_eq!(category.confidence(), 85);
    }

    #[test]
    fn test_accents_are_folded() {
        let category = extractor().extract("PANADERÍA Y CAFETERÍA", "");
        assert_eq!(category.value, Category::Comida);
        assert_eq!(category.confidence(), 60);
    }

    #[test]
    fn test_confidence_grows_and_caps() {
        let one = extractor().extract("ESTACION: gasolina", "");
        let two = extractor().extract("gasolina parking", "");
        let many = extractor().extract("gasolina parking taxi peaje autopista", "");
        assert_eq!(one.confidence(), 30);
        assert_eq!(two.confidence(), 60);
        assert_eq!(many.confidence(), 85);
        assert!(one.confidence() < two.confidence() && two.confidence() < many.confidence());
    }

    #[test]
    fn test_tie_goes_to_first_rule() {
        let rules = vec![
            CategoryRule::new(Category::Compras, &["tienda"]),
            CategoryRule::new(Category::Entretenimiento, &["cine"]),
        ];
        let category = CategoryExtractor::new(&rules).extract("tienda del cine", "");
        assert_eq!(category.value, Category::Compras);
    }

    #[test]
    fn test_repeated_keyword_counts_once() {
        let category = extractor().extract("taxi taxi taxi", "");
        assert_eq!(category.value, Category::Transporte);
        assert_eq!(category.confidence(), 30);
    }

    #[test]
    fn test_no_match_is_fallback() {
        let category = extractor().extract("NOTARIA LOPEZ", "");
        assert_eq!(category, FieldValue::category_not_found());
        assert_eq!(category.value, Category::Otros);
    }

    #[test]
    fn test_fallback_keywords_are_ignored() {
        let rules = vec![CategoryRule::new(Category::Otros, &["notaria"])];
        let category = CategoryExtractor::new(&rules).extract("NOTARIA", "");
        assert_eq!(category.confidence(), 0);
    }
}
