//! # Package Types
//!
//! Reading packages sold by the storefront.
//! Packages are created lazily by the first order that names them, or
//! seeded from `config/packages.toml`.

use crate::error::{PaymentError, PaymentResult};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// The only currency the storefront charges in (ISO 4217)
pub const CURRENCY: &str = "EUR";

/// Minor units per major unit of [`CURRENCY`]
const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Convert a major-unit price to minor units (cents).
///
/// Rejects prices that are not strictly positive or that overflow `i64`.
pub fn to_minor_units(price: Decimal) -> PaymentResult<i64> {
    if price <= Decimal::ZERO {
        return Err(PaymentError::Validation(format!(
            "Package price must be positive, got {}",
            price
        )));
    }

    (price * Decimal::from(MINOR_UNITS_PER_MAJOR))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| PaymentError::Validation(format!("Package price out of range: {}", price)))
}

/// URL-friendly key derived from a package name
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// A package in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: i64,

    /// Unique human key
    pub name: String,

    pub slug: String,

    pub description: String,

    /// Price in major units
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,

    /// Ordered feature bullets
    #[serde(default)]
    pub features: Vec<String>,

    pub created_at: DateTime<Utc>,
}

/// Values used to create (or re-seed) a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDraft {
    pub name: String,

    pub price: Decimal,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub features: Vec<String>,
}

impl PackageDraft {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            price,
            description: String::new(),
            features: Vec::new(),
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: add a feature bullet
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Check name and price before the draft reaches a store
    pub fn validate(&self) -> PaymentResult<()> {
        if self.name.trim().is_empty() {
            return Err(PaymentError::Validation(
                "Package name is required".to_string(),
            ));
        }
        to_minor_units(self.price)?;
        Ok(())
    }
}

/// Package catalog (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageCatalog {
    #[serde(default)]
    pub packages: Vec<PackageDraft>,
}

impl PackageCatalog {
    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> PaymentResult<Self> {
        let catalog: PackageCatalog = toml::from_str(toml_str)
            .map_err(|e| PaymentError::Configuration(format!("Invalid package catalog: {}", e)))?;

        for package in &catalog.packages {
            package.validate()?;
        }

        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(dec!(147)).unwrap(), 14700);
        assert_eq!(to_minor_units(dec!(19.99)).unwrap(), 1999);
        assert_eq!(to_minor_units(dec!(0.005)).unwrap(), 1);
    }

    #[test]
    fn test_non_positive_price_rejected() {
        assert!(matches!(
            to_minor_units(Decimal::ZERO),
            Err(PaymentError::Validation(_))
        ));
        assert!(to_minor_units(dec!(-47)).is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Soul Blueprint"), "soul-blueprint");
        assert_eq!(slugify("  Destiny   Mastery "), "destiny-mastery");
    }

    #[test]
    fn test_catalog_from_toml() {
        let catalog = PackageCatalog::from_toml(
            r#"
            [[packages]]
            name = "Cosmic Awakening"
            price = 47
            description = "15-page beginner report"
            features = ["Sun & Moon sign analysis", "Email delivery in 24h"]

            [[packages]]
            name = "Soul Blueprint"
            price = "147.00"
            "#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.packages[0].price, dec!(47));
        assert_eq!(catalog.packages[0].features.len(), 2);
        assert_eq!(catalog.packages[1].slug(), "soul-blueprint");
        assert!(catalog.packages[1].description.is_empty());
    }

    #[test]
    fn test_catalog_rejects_free_package() {
        let result = PackageCatalog::from_toml(
            r#"
            [[packages]]
            name = "Freebie"
            price = 0
            "#,
        );
        assert!(result.is_err());
    }
}
