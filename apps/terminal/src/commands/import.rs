//! # Bulk Import and Categorizer
//!
//! Admin utilities run outside the sales flow.
//!
//! ## Import Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products.csv / products.json                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ImportRow (decimal prices "3.50")                                      │
//! │       │   empty category? ──► Categorizer (keyword rules)               │
//! │       ▼                                                                 │
//! │  known barcode? ──yes──► skipped                                        │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  category upserted, product inserted (+ "initial stock" movement)       │
//! │                                                                         │
//! │  A bad row is reported with its line number; the rest still import.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## CSV Columns
//! `name,barcode,category,subcategory,price,cost,stock,min_stock,units_per_box,unit_price,expiration_date`
//! Only `name` and `price` are required.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::commands::product::CreateProductRequest;
use crate::error::ApiError;
use crate::state::{DbState, SessionState};
use minimarket_core::categorize::{Categorizer, CategoryMatch, CategoryRule};
use minimarket_core::report::UNCATEGORIZED;
use minimarket_core::users::Permission;
use minimarket_core::Money;

/// One product as it appears in an import file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportRow {
    pub name: String,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Decimal, e.g. `3.50` (box price for closed products).
    pub price: String,
    #[serde(default)]
    pub cost: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub min_stock: Option<i64>,
    #[serde(default)]
    pub units_per_box: Option<i64>,
    /// Loose-unit price of a closed product.
    #[serde(default)]
    pub unit_price: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

fn parse_price(field: &str, value: &str) -> Result<i64, ApiError> {
    Money::parse_decimal(value)
        .map(|m| m.cents())
        .ok_or_else(|| ApiError::validation(format!("{}: '{}' is not a price", field, value)))
}

fn parse_optional_price(field: &str, value: Option<&str>) -> Result<Option<i64>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse_price(field, v).map(Some),
        None => Ok(None),
    }
}

impl ImportRow {
    fn into_request(self, categorizer: &Categorizer) -> Result<CreateProductRequest, ApiError> {
        let price_cents = parse_price("price", &self.price)?;
        let cost_cents = parse_optional_price("cost", self.cost.as_deref())?;
        let unit_price_cents = parse_optional_price("unit_price", self.unit_price.as_deref())?;

        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let (category, subcategory) = match category {
            Some(category) => (category, self.subcategory),
            None => match categorizer.categorize(&self.name) {
                Some(hit) => (hit.category, self.subcategory.or(hit.subcategory)),
                None => (UNCATEGORIZED.to_string(), self.subcategory),
            },
        };

        Ok(CreateProductRequest {
            name: self.name,
            barcode: self.barcode,
            category,
            subcategory,
            price_cents,
            cost_cents,
            stock: self.stock.unwrap_or(0),
            min_stock: self.min_stock.unwrap_or(0),
            units_per_box: self.units_per_box,
            unit_price_cents,
            expiration_date: self.expiration_date,
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    /// 1-based data row (header excluded).
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    /// Barcode already in the catalog.
    pub skipped: usize,
    /// Category filled in by the keyword rules.
    pub categorized: usize,
    pub errors: Vec<RowError>,
}

/// Reads rows from a `.csv` or `.json` file.
pub fn read_rows(path: &Path) -> Result<Vec<Result<ImportRow, String>>, ApiError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("csv") => {
            let mut reader = csv::ReaderBuilder::new()
                .trim(csv::Trim::All)
                .flexible(true)
                .from_path(path)
                .map_err(|e| ApiError::validation(format!("Cannot open {}: {}", path.display(), e)))?;
            Ok(reader
                .deserialize::<ImportRow>()
                .map(|row| row.map_err(|e| e.to_string()))
                .collect())
        }
        Some("json") => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ApiError::validation(format!("Cannot read {}: {}", path.display(), e)))?;
            let rows: Vec<ImportRow> = serde_json::from_str(&text)
                .map_err(|e| ApiError::validation(format!("Invalid JSON in {}: {}", path.display(), e)))?;
            Ok(rows.into_iter().map(Ok).collect())
        }
        _ => Err(ApiError::validation(
            "Import files must end in .csv or .json",
        )),
    }
}

/// Loads categorizer rules from a JSON array or a TOML `[[rules]]` file.
pub fn load_categorizer(rules_path: Option<&Path>) -> Result<Categorizer, ApiError> {
    #[derive(Deserialize)]
    struct RuleFile {
        rules: Vec<CategoryRule>,
    }

    let Some(path) = rules_path else {
        return Ok(Categorizer::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| ApiError::validation(format!("Cannot read {}: {}", path.display(), e)))?;

    let rules: Vec<CategoryRule> = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&text)
            .map_err(|e| ApiError::validation(format!("Invalid rules in {}: {}", path.display(), e)))?
    } else {
        toml::from_str::<RuleFile>(&text)
            .map_err(|e| ApiError::validation(format!("Invalid rules in {}: {}", path.display(), e)))?
            .rules
    };
    debug!(rules = rules.len(), path = %path.display(), "Loaded categorizer rules");
    Ok(Categorizer::new(rules))
}

async fn ensure_category(
    db: &DbState,
    category: &str,
    subcategory: Option<&str>,
) -> Result<(), ApiError> {
    let categories = db.inner().categories();
    if categories.get_by_name(category).await?.is_none() {
        categories.upsert(category, &[]).await?;
    }
    if let Some(sub) = subcategory {
        categories.add_subcategory(category, sub).await?;
    }
    Ok(())
}

pub async fn import_products(
    db: &DbState,
    session: &SessionState,
    path: PathBuf,
    rules_path: Option<PathBuf>,
) -> Result<ImportSummary, ApiError> {
    let user = session.require(Permission::ManageProducts)?;
    let categorizer = load_categorizer(rules_path.as_deref())?;
    let rows = read_rows(&path)?;
    info!(path = %path.display(), rows = rows.len(), "Importing products");

    let products = db.inner().products();
    let mut summary = ImportSummary::default();

    for (index, row) in rows.into_iter().enumerate() {
        let row_number = index + 1;
        let fail = |message: String| RowError {
            row: row_number,
            message,
        };

        let row = match row {
            Ok(row) => row,
            Err(message) => {
                summary.errors.push(fail(message));
                continue;
            }
        };
        let had_category = row.category.as_deref().is_some_and(|c| !c.trim().is_empty());

        let request = match row.into_request(&categorizer) {
            Ok(request) => request,
            Err(e) => {
                summary.errors.push(fail(e.message));
                continue;
            }
        };

        if let Some(barcode) = request.barcode.as_deref().filter(|b| !b.trim().is_empty()) {
            if products.get_by_barcode(barcode.trim()).await?.is_some() {
                debug!(barcode, "Barcode already in catalog, skipping");
                summary.skipped += 1;
                continue;
            }
        }

        let categorized = !had_category && request.category != UNCATEGORIZED;
        let category = request.category.clone();
        let subcategory = request.subcategory.clone();

        let result = async {
            let product = request.into_product()?;
            ensure_category(db, &category, subcategory.as_deref()).await?;
            products.insert(&product, &user.id).await?;
            Ok::<(), ApiError>(())
        }
        .await;

        match result {
            Ok(()) => {
                summary.imported += 1;
                if categorized {
                    summary.categorized += 1;
                }
            }
            Err(e) => summary.errors.push(fail(e.message)),
        }
    }

    if !summary.errors.is_empty() {
        warn!(errors = summary.errors.len(), "Some rows were not imported");
    }
    info!(
        imported = summary.imported,
        skipped = summary.skipped,
        categorized = summary.categorized,
        "Import finished"
    );
    Ok(summary)
}

/// A proposed (or applied) category change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySuggestion {
    pub product_id: String,
    pub name: String,
    pub current_category: String,
    #[serde(flatten)]
    pub suggestion: CategoryMatch,
}

/// Runs the keyword rules over products without a category (or over all
/// of them with `all`). Nothing changes unless `apply` is set.
pub async fn categorize_products(
    db: &DbState,
    session: &SessionState,
    apply: bool,
    all: bool,
    rules_path: Option<PathBuf>,
) -> Result<Vec<CategorySuggestion>, ApiError> {
    session.require(Permission::ManageProducts)?;
    let categorizer = load_categorizer(rules_path.as_deref())?;

    let mut suggestions = Vec::new();
    for product in db.inner().products().list(false).await? {
        let missing = product.category.trim().is_empty() || product.category == UNCATEGORIZED;
        if !missing && !all {
            continue;
        }
        let Some(hit) = categorizer.categorize(&product.name) else {
            continue;
        };
        if hit.category == product.category && hit.subcategory == product.subcategory {
            continue;
        }
        suggestions.push(CategorySuggestion {
            product_id: product.id,
            name: product.name,
            current_category: product.category,
            suggestion: hit,
        });
    }

    if apply {
        for s in &suggestions {
            let category = &s.suggestion.category;
            let subcategory = s.suggestion.subcategory.as_deref();
            ensure_category(db, category, subcategory).await?;
            db.inner()
                .products()
                .assign_category(&s.product_id, category, subcategory)
                .await?;
        }
        info!(changed = suggestions.len(), "Categories applied");
    }

    Ok(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed_product, terminal};
    use minimarket_core::users::Role;

    const CSV: &str = "\
name,barcode,category,subcategory,price,cost,stock,min_stock,units_per_box,unit_price,expiration_date
Inca Kola 500ml,7750182000123,,,3.50,2.40,24,6,,,
Hamilton Azul x20,7751234000017,Cigarrillos,,14.00,,46,,20,0.80,
Producto raro,,Otros,,abc,,,,,,
";

    #[tokio::test]
    async fn test_csv_import_categorizes_and_reports_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.csv");
        std::fs::write(&path, CSV).unwrap();

        let t = terminal(Role::Manager).await;
        let summary = import_products(&t.db, &t.session, path.clone(), None)
            .await
            .unwrap();

        assert_eq!(summary.imported, 2);
        assert_eq!(summary.categorized, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].row, 3);

        let inca = t
            .db
            .inner()
            .products()
            .get_by_barcode("7750182000123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inca.category, "Bebidas");
        assert_eq!(inca.subcategory.as_deref(), Some("Gaseosas"));

        let hamilton = t
            .db
            .inner()
            .products()
            .get_by_barcode("7751234000017")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hamilton.closed.unwrap().boxes, 2);

        // Second run skips what is already there.
        let again = import_products(&t.db, &t.session, path, None).await.unwrap();
        assert_eq!(again.imported, 0);
        assert_eq!(again.skipped, 2);
    }

    #[tokio::test]
    async fn test_json_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.json");
        std::fs::write(
            &path,
            r#"[{"name": "Leche Gloria Azul", "price": "4.20", "stock": 12}]"#,
        )
        .unwrap();

        let t = terminal(Role::Manager).await;
        let summary = import_products(&t.db, &t.session, path, None).await.unwrap();
        assert_eq!(summary.imported, 1);

        let categories = t.db.inner().categories().list().await.unwrap();
        assert!(categories.iter().any(|c| c.name == "Lácteos"));
    }

    #[tokio::test]
    async fn test_categorize_dry_run_then_apply() {
        let t = terminal(Role::Manager).await;
        let product = seed_product(&t, "Galletas Soda Field", "7750002", 10).await;
        t.db.inner()
            .products()
            .assign_category(&product.id, UNCATEGORIZED, None)
            .await
            .unwrap();

        let dry = categorize_products(&t.db, &t.session, false, false, None)
            .await
            .unwrap();
        assert_eq!(dry.len(), 1);
        assert_eq!(dry[0].suggestion.category, "Snacks");
        let unchanged = t.db.inner().products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(unchanged.category, UNCATEGORIZED);

        categorize_products(&t.db, &t.session, true, false, None)
            .await
            .unwrap();
        let changed = t.db.inner().products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(changed.category, "Snacks");
        assert_eq!(changed.subcategory.as_deref(), Some("Galletas"));
    }

    #[test]
    fn test_toml_rules_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(
            &path,
            "[[rules]]\nkeyword = \"panetón\"\ncategory = \"Temporada\"\n",
        )
        .unwrap();

        let categorizer = load_categorizer(Some(&path)).unwrap();
        let hit = categorizer.categorize("Paneton D'Onofrio 900g").unwrap();
        assert_eq!(hit.category, "Temporada");
    }
}
