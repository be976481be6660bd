use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model references the catalog sources use for products that are listed but not released.
const UNRELEASED_MARKERS: &[&str] = &["is coming", "is loading"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    /// Remote model reference; `None` while the product is not released.
    pub model_ref: Option<String>,
    /// Texture image, relative to the catalog asset root unless absolute.
    pub texture: Option<PathBuf>,
}

impl Product {
    /// First whitespace-separated token of the name, e.g. `C1012`.
    pub fn short_code(&self) -> &str {
        short_code(&self.name)
    }

    pub fn is_available(&self) -> bool {
        self.model_ref.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductGroup {
    pub name: String,
    pub color: String,
    pub products: IndexMap<String, Product>,
}

/// A product picked by the caller, resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSelection {
    pub code: String,
    pub short_code: String,
    pub texture_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("product '{0}' is listed more than once")]
    DuplicateProduct(String),
}

/// Immutable product reference data, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    groups: IndexMap<String, ProductGroup>,
    asset_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    groups: Vec<GroupFile>,
}

#[derive(Debug, Deserialize)]
struct GroupFile {
    name: String,
    #[serde(default)]
    color: String,
    products: Vec<ProductFile>,
}

#[derive(Debug, Deserialize)]
struct ProductFile {
    name: String,
    model_ref: Option<String>,
    texture: Option<PathBuf>,
}

impl ProductCatalog {
    pub fn new(groups: IndexMap<String, ProductGroup>, asset_root: impl Into<PathBuf>) -> Self {
        Self {
            groups,
            asset_root: asset_root.into(),
        }
    }

    pub fn builtin(asset_root: impl Into<PathBuf>) -> Self {
        Self::new(default_groups(), asset_root)
    }

    pub fn from_json_file(
        path: &Path,
        asset_root: impl Into<PathBuf>,
    ) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw, asset_root)
    }

    pub fn from_json_str(raw: &str, asset_root: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let parsed: CatalogFile = serde_json::from_str(raw)?;
        let mut groups = IndexMap::new();
        let mut seen = std::collections::HashSet::new();
        for group in parsed.groups {
            let mut products = IndexMap::new();
            for product in group.products {
                if !seen.insert(product.name.clone()) {
                    return Err(CatalogError::DuplicateProduct(product.name));
                }
                let model_ref = product.model_ref.filter(|value| is_released_ref(value));
                products.insert(
                    product.name.clone(),
                    Product {
                        name: product.name,
                        model_ref,
                        texture: product.texture,
                    },
                );
            }
            groups.insert(
                group.name.clone(),
                ProductGroup {
                    name: group.name,
                    color: group.color,
                    products,
                },
            );
        }
        Ok(Self::new(groups, asset_root))
    }

    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    pub fn groups(&self) -> impl Iterator<Item = &ProductGroup> {
        self.groups.values()
    }

    pub fn get(&self, name: &str) -> Option<&Product> {
        self.groups
            .values()
            .find_map(|group| group.products.get(name))
    }

    pub fn available(&self) -> impl Iterator<Item = &Product> {
        self.groups
            .values()
            .flat_map(|group| group.products.values())
            .filter(|product| product.is_available())
    }

    pub fn select(&self, name: &str) -> Option<ProductSelection> {
        let product = self.get(name)?;
        Some(ProductSelection {
            code: product.name.clone(),
            short_code: product.short_code().to_string(),
            texture_path: product
                .texture
                .as_ref()
                .map(|texture| self.asset_root.join(texture)),
        })
    }
}

pub fn short_code(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}

fn is_released_ref(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && !UNRELEASED_MARKERS.contains(&trimmed)
}

fn default_groups() -> IndexMap<String, ProductGroup> {
    let mut groups = IndexMap::new();

    let mut insert = |name: &str, color: &str, rows: &[(&str, Option<&str>, Option<&str>)]| {
        let products = rows
            .iter()
            .map(|(product, model_ref, texture)| {
                (
                    (*product).to_string(),
                    Product {
                        name: (*product).to_string(),
                        model_ref: model_ref.map(str::to_string),
                        texture: texture.map(PathBuf::from),
                    },
                )
            })
            .collect();
        groups.insert(
            name.to_string(),
            ProductGroup {
                name: name.to_string(),
                color: color.to_string(),
                products,
            },
        );
    };

    insert(
        "Standard",
        "#FFCCCC",
        &[
            ("C1012 Glacier White", Some("817687427545199895"), Some("product_images/C1012.jpg")),
            ("C1026 Polar", Some("819910519797326073"), Some("product_images/C1026.jpg")),
            ("C3269 Ash Grey", Some("821839484099264081"), Some("product_images/C3269.jpg")),
            ("C3168 Silver Wave", Some("821849044696643212"), Some("product_images/C3168.jpg")),
            ("C1005 Milky White", Some("821948258441171133"), Some("product_images/C1005.jpg")),
        ],
    );
    insert(
        "Deluxe",
        "#CCFFCC",
        &[
            ("C2103 Onyx Carrara", Some("827090618489513527"), Some("product_images/C2103.jpg")),
            ("C2104 Massa", Some("822075428127644644"), Some("product_images/C2104.jpg")),
            ("C3105 Casla Cloudy", Some("828912225788997963"), Some("product_images/C3105.jpg")),
            ("C3146 Casla Nova", Some("828013009961087650"), Some("product_images/C3146.jpg")),
            ("C2240 Marquin", Some("828085015087780649"), Some("product_images/C2240.jpg")),
            (
                "C2262 Concrete (Honed)",
                Some("822211862058871636"),
                Some("product_images/C2262.jpg"),
            ),
            ("C3311 Calacatta Sky", Some("829984593223502930"), Some("product_images/C3311.jpg")),
            ("C3346 Massimo", Some("827938741386607132"), Some("product_images/C3346.jpg")),
        ],
    );
    insert(
        "Luxury",
        "#CCCCFF",
        &[
            ("C4143 Mario", Some("829984593223502930"), Some("product_images/C4143.jpg")),
            ("C4145 Marina", Some("828132560375742058"), Some("product_images/C4145.jpg")),
            ("C4202 Calacatta Gold", Some("828167757632695310"), Some("product_images/C4202.jpg")),
            ("C1205 Casla Everest", Some("828296778450463190"), Some("product_images/C1205.jpg")),
            (
                "C4211 Calacatta Supreme",
                Some("828436321937882328"),
                Some("product_images/C4211.jpg"),
            ),
            (
                "C4204 Calacatta Classic",
                Some("828422973179466146"),
                Some("product_images/C4204.jpg"),
            ),
            ("C5240 Spring", None, None),
            ("C1102 Super White", Some("828545723344775887"), Some("product_images/C1102.jpg")),
            ("C4246 Casla Mystery", Some("828544778451950698"), Some("product_images/C4246.jpg")),
            ("C4345 Oro", Some("828891068780182635"), Some("product_images/C4345.jpg")),
            ("C4346 Luxe", Some("829436426547535131"), Some("product_images/C4346.jpg")),
            ("C4342 Casla Eternal", Some("829190256201829181"), Some("product_images/C4342.jpg")),
            ("C4221 Athena", Some("829644354504131520"), Some("product_images/C4221.jpg")),
            ("C4222 Lagoon", None, None),
            ("C5225 Amber", None, None),
        ],
    );
    insert(
        "Super Luxury",
        "#CCFCFF",
        &[(
            "C4255 Calacatta Extra",
            Some("829659013227537217"),
            Some("product_images/C4255.jpg"),
        )],
    );

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_keeps_group_order() {
        let catalog = ProductCatalog::builtin("/assets");
        let names: Vec<&str> = catalog.groups().map(|group| group.name.as_str()).collect();
        assert_eq!(names, vec!["Standard", "Deluxe", "Luxury", "Super Luxury"]);
    }

    #[test]
    fn select_resolves_texture_against_asset_root() {
        let catalog = ProductCatalog::builtin("/assets");
        let selection = catalog.select("C1012 Glacier White").expect("known product");
        assert_eq!(selection.short_code, "C1012");
        assert_eq!(
            selection.texture_path,
            Some(PathBuf::from("/assets/product_images/C1012.jpg"))
        );
        assert!(catalog.select("C9999 Unknown").is_none());
    }

    #[test]
    fn unreleased_products_are_listed_but_unavailable() {
        let catalog = ProductCatalog::builtin(".");
        let spring = catalog.get("C5240 Spring").expect("listed");
        assert!(!spring.is_available());
        assert!(catalog.available().all(|product| product.name != "C5240 Spring"));
        assert_eq!(catalog.available().count(), 26);
    }

    #[test]
    fn json_catalog_normalizes_placeholder_refs() -> anyhow::Result<()> {
        let catalog = ProductCatalog::from_json_str(
            r##"{"groups": [{"name": "Test", "color": "#000", "products": [
                {"name": "C1 One", "model_ref": "123", "texture": "one.jpg"},
                {"name": "C2 Two", "model_ref": "is coming"}
            ]}]}"##,
            "/root",
        )?;
        assert!(catalog.get("C1 One").expect("c1").is_available());
        assert!(!catalog.get("C2 Two").expect("c2").is_available());
        Ok(())
    }

    #[test]
    fn json_catalog_rejects_duplicate_products() {
        let err = ProductCatalog::from_json_str(
            r#"{"groups": [
                {"name": "A", "products": [{"name": "C1 One"}]},
                {"name": "B", "products": [{"name": "C1 One"}]}
            ]}"#,
            ".",
        )
        .err();
        assert!(matches!(err, Some(CatalogError::DuplicateProduct(name)) if name == "C1 One"));
    }

    #[test]
    fn json_catalog_file_round_trips_from_disk() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"groups": [{"name": "A", "products": [{"name": "C7 Seven", "model_ref": "7"}]}]}"#,
        )?;
        let catalog = ProductCatalog::from_json_file(&path, temp.path())?;
        assert_eq!(catalog.asset_root(), temp.path());
        assert_eq!(catalog.get("C7 Seven").map(Product::short_code), Some("C7"));
        Ok(())
    }
}
