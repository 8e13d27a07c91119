//! # Categorize Module
//!
//! Keyword categorizer used by the bulk importer and the `categorize`
//! admin command to fill in missing categories.
//!
//! Matching is case- and accent-insensitive on whole words of the product
//! name. When several keywords match, the longest one wins ("agua tonica"
//! beats "agua"); ties go to the rule listed first.
//!
//! ```rust
//! use minimarket_core::categorize::Categorizer;
//!
//! let categorizer = Categorizer::default();
//! let hit = categorizer.categorize("LECHE GLORIA AZUL 400G").unwrap();
//! assert_eq!(hit.category, "Lácteos");
//! assert_eq!(hit.subcategory.as_deref(), Some("Leche"));
//! ```

use serde::{Deserialize, Serialize};

/// `keyword → category[/subcategory]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub keyword: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
}

impl CategoryRule {
    pub fn new(keyword: &str, category: &str, subcategory: Option<&str>) -> Self {
        CategoryRule {
            keyword: keyword.to_string(),
            category: category.to_string(),
            subcategory: subcategory.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub category: String,
    pub subcategory: Option<String>,
    pub keyword: String,
}

#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Vec<(Vec<String>, CategoryRule)>,
}

impl Categorizer {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter_map(|rule| {
                let words = tokens(&rule.keyword);
                (!words.is_empty()).then_some((words, rule))
            })
            .collect();
        Categorizer { rules }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn categorize(&self, product_name: &str) -> Option<CategoryMatch> {
        let words = tokens(product_name);

        let mut best: Option<(usize, &CategoryRule)> = None;
        for (keyword, rule) in &self.rules {
            if !contains_sequence(&words, keyword) {
                continue;
            }
            let len: usize = keyword.iter().map(|w| w.chars().count()).sum::<usize>() + keyword.len();
            if best.map_or(true, |(best_len, _)| len > best_len) {
                best = Some((len, rule));
            }
        }

        best.map(|(_, rule)| CategoryMatch {
            category: rule.category.clone(),
            subcategory: rule.subcategory.clone(),
            keyword: rule.keyword.clone(),
        })
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        Categorizer::new(default_rules())
    }
}

fn contains_sequence(words: &[String], keyword: &[String]) -> bool {
    words.windows(keyword.len()).any(|window| window == keyword)
}

/// Lowercases, strips Spanish accents and splits on anything that is not
/// a letter or digit.
pub fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rules for a typical Peruvian minimarket.
pub fn default_rules() -> Vec<CategoryRule> {
    let table: &[(&str, &str, Option<&str>)] = &[
        ("cigarro", "Cigarrillos", None),
        ("cigarrillo", "Cigarrillos", None),
        ("cigarrillos", "Cigarrillos", None),
        ("hamilton", "Cigarrillos", None),
        ("lucky", "Cigarrillos", None),
        ("marlboro", "Cigarrillos", None),
        ("gaseosa", "Bebidas", Some("Gaseosas")),
        ("inca kola", "Bebidas", Some("Gaseosas")),
        ("coca cola", "Bebidas", Some("Gaseosas")),
        ("sprite", "Bebidas", Some("Gaseosas")),
        ("agua", "Bebidas", Some("Agua")),
        ("agua tonica", "Bebidas", Some("Gaseosas")),
        ("cerveza", "Bebidas", Some("Cervezas")),
        ("pilsen", "Bebidas", Some("Cervezas")),
        ("cusquena", "Bebidas", Some("Cervezas")),
        ("jugo", "Bebidas", Some("Jugos")),
        ("energizante", "Bebidas", Some("Energizantes")),
        ("leche", "Lácteos", Some("Leche")),
        ("yogurt", "Lácteos", Some("Yogurt")),
        ("queso", "Lácteos", Some("Quesos")),
        ("mantequilla", "Lácteos", None),
        ("papitas", "Snacks", None),
        ("chifles", "Snacks", None),
        ("galleta", "Snacks", Some("Galletas")),
        ("galletas", "Snacks", Some("Galletas")),
        ("chocolate", "Snacks", Some("Golosinas")),
        ("caramelo", "Snacks", Some("Golosinas")),
        ("chicle", "Snacks", Some("Golosinas")),
        ("arroz", "Abarrotes", None),
        ("azucar", "Abarrotes", None),
        ("aceite", "Abarrotes", None),
        ("fideo", "Abarrotes", None),
        ("fideos", "Abarrotes", None),
        ("atun", "Abarrotes", Some("Conservas")),
        ("sal", "Abarrotes", None),
        ("detergente", "Limpieza", None),
        ("lejia", "Limpieza", None),
        ("lavavajilla", "Limpieza", None),
        ("papel higienico", "Cuidado personal", None),
        ("shampoo", "Cuidado personal", None),
        ("jabon", "Cuidado personal", None),
        ("pasta dental", "Cuidado personal", None),
    ];

    table
        .iter()
        .map(|(keyword, category, sub)| CategoryRule::new(keyword, category, *sub))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_accents() {
        assert_eq!(normalize("Azúcar RUBIA Ñandú"), "azucar rubia nandu");
    }

    #[test]
    fn test_longest_keyword_wins() {
        let c = Categorizer::default();
        let hit = c.categorize("Agua Tónica Schweppes 500ml").unwrap();
        assert_eq!(hit.keyword, "agua tonica");
        assert_eq!(hit.subcategory.as_deref(), Some("Gaseosas"));

        let hit = c.categorize("Agua San Luis 625ml").unwrap();
        assert_eq!(hit.subcategory.as_deref(), Some("Agua"));
    }

    #[test]
    fn test_whole_words_only() {
        let c = Categorizer::default();
        // "sal" must not match inside "salsa"
        assert!(c.categorize("Salsa Huancaína").is_none());
        assert_eq!(c.categorize("Sal de Maras").unwrap().category, "Abarrotes");
    }

    #[test]
    fn test_multi_word_keywords() {
        let c = Categorizer::default();
        assert_eq!(
            c.categorize("INCA-KOLA 1.5L").unwrap().subcategory.as_deref(),
            Some("Gaseosas")
        );
        assert_eq!(c.categorize("Cigarro Hamilton Azul x20").unwrap().category, "Cigarrillos");
    }

    #[test]
    fn test_custom_rules_and_empty_keywords() {
        let c = Categorizer::new(vec![
            CategoryRule::new("  ", "Nada", None),
            CategoryRule::new("pan", "Panadería", None),
        ]);
        assert_eq!(c.rule_count(), 1);
        assert_eq!(c.categorize("Pan Francés").unwrap().category, "Panadería");
        assert!(c.categorize("Panetón").is_none());
    }
}
