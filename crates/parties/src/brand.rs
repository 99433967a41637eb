use serde::{Deserialize, Serialize};

use bonus_core::{DomainError, DomainResult, Entity, entity_id};

entity_id!(
    /// Brand identifier.
    BrandId
);

/// A product line, recognised on invoice lines by the prefix of the item code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: BrandId,
    pub name: String,
    /// Item-code prefix in the ERP (commonly 1-3 characters).
    pub prefix: String,
}

impl Brand {
    pub fn new(id: BrandId, name: impl Into<String>, prefix: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        let prefix = prefix.into();
        if prefix.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "brand '{name}' must have a non-empty prefix"
            )));
        }
        Ok(Self { id, name, prefix })
    }

    /// Whether an invoice line with this item code belongs to the brand.
    pub fn matches(&self, item_code: &str) -> bool {
        item_code.starts_with(&self.prefix)
    }
}

impl Entity for Brand {
    type Id = BrandId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Snapshot of the known brands, built once per batch and passed explicitly
/// to ingestion and accrual.
///
/// Prefixes may overlap (`"A"` and `"AB"`); a line then counts toward every
/// brand whose prefix it starts with.
#[derive(Debug, Clone, Default)]
pub struct BrandCatalog {
    brands: Vec<Brand>,
}

impl BrandCatalog {
    pub fn new(mut brands: Vec<Brand>) -> Self {
        brands.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.prefix.cmp(&b.prefix)));
        Self { brands }
    }

    pub fn brands(&self) -> &[Brand] {
        &self.brands
    }

    pub fn get(&self, id: BrandId) -> Option<&Brand> {
        self.brands.iter().find(|b| b.id == id)
    }

    /// Brands an item code is attributed to.
    pub fn matching<'a>(&'a self, item_code: &'a str) -> impl Iterator<Item = &'a Brand> + 'a {
        self.brands.iter().filter(move |b| b.matches(item_code))
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.brands.len()
    }
}
