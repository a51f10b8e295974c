//! The product record and its inputs.

mod slug;
mod state;

pub use slug::slugify;
pub use state::ProductStatus;

use chrono::{DateTime, Utc};
use common::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ProductError, Result};

/// A product row as owned by the product store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub slug: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Overwrites the fields present in `changes`.
    ///
    /// Empty strings and a zero price mean "unchanged". The slug is always
    /// regenerated from the resulting name.
    pub fn apply_changes(&mut self, changes: &ProductChanges) -> Result<()> {
        if let Some(name) = changes.name.as_deref().filter(|n| !n.trim().is_empty()) {
            self.name = name.to_string();
        }
        if let Some(description) = changes.description.as_deref().filter(|d| !d.is_empty()) {
            self.description = description.to_string();
        }
        if let Some(price) = changes.price.filter(|p| !p.is_zero()) {
            validate_price(price)?;
            self.price = price;
        }
        self.slug = slugify(&self.name);
        Ok(())
    }
}

/// Input for inserting a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, description: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            price,
        }
    }

    /// Rejects blank names and negative prices.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ProductError::Validation("name is required".to_string()));
        }
        validate_price(self.price)
    }
}

/// A partial metadata update. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
}

impl ProductChanges {
    /// Returns true if applying these changes would leave every field as is.
    pub fn is_empty(&self) -> bool {
        self.name.as_deref().is_none_or(|n| n.trim().is_empty())
            && self.description.as_deref().is_none_or(str::is_empty)
            && self.price.is_none_or(|p| p.is_zero())
    }
}

/// Decimal places a stored price keeps.
pub const PRICE_SCALE: u32 = 2;

/// Checks `price` against what the `NUMERIC(12, 2)` column holds exactly:
/// not negative, at most two decimal places, below ten billion.
pub fn validate_price(price: Decimal) -> Result<()> {
    let max = Decimal::new(999_999_999_999, PRICE_SCALE);
    if (price.is_sign_negative() && !price.is_zero())
        || price.normalize().scale() > PRICE_SCALE
        || price > max
    {
        return Err(ProductError::InvalidPrice(price));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn product() -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(1),
            name: "Desk Lamp".to_string(),
            description: "Warm light".to_string(),
            slug: "desk-lamp-1".to_string(),
            price: Decimal::from_str("19.99").unwrap(),
            image_url: Some("http://localhost/images/1.jpg".to_string()),
            status: ProductStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_apply_changes_overwrites_present_fields() {
        let mut p = product();
        let changes = ProductChanges {
            name: Some("Floor Lamp".to_string()),
            description: None,
            price: Some(Decimal::from_str("49.50").unwrap()),
        };

        p.apply_changes(&changes).unwrap();

        assert_eq!(p.name, "Floor Lamp");
        assert_eq!(p.description, "Warm light");
        assert_eq!(p.price, Decimal::from_str("49.50").unwrap());
        assert!(p.slug.starts_with("floor-lamp-"));
        assert_eq!(p.image_url.as_deref(), Some("http://localhost/images/1.jpg"));
    }

    #[test]
    fn test_empty_strings_and_zero_price_mean_unchanged() {
        let mut p = product();
        let changes = ProductChanges {
            name: Some(String::new()),
            description: Some(String::new()),
            price: Some(Decimal::ZERO),
        };
        assert!(changes.is_empty());

        p.apply_changes(&changes).unwrap();

        assert_eq!(p.name, "Desk Lamp");
        assert_eq!(p.description, "Warm light");
        assert_eq!(p.price, Decimal::from_str("19.99").unwrap());
        // Slug is regenerated even when nothing else changed.
        assert!(p.slug.starts_with("desk-lamp-"));
        assert_ne!(p.slug, "desk-lamp-1");
    }

    #[test]
    fn test_negative_price_rejected() {
        let mut p = product();
        let changes = ProductChanges {
            price: Some(Decimal::from(-5)),
            ..Default::default()
        };
        assert!(matches!(
            p.apply_changes(&changes),
            Err(ProductError::InvalidPrice(_))
        ));

        let new = NewProduct::new("Lamp", "", Decimal::from(-1));
        assert!(matches!(new.validate(), Err(ProductError::InvalidPrice(_))));
    }

    #[test]
    fn test_price_must_fit_the_column() {
        let price = |s: &str| Decimal::from_str(s).unwrap();

        assert!(validate_price(price("19.99")).is_ok());
        assert!(validate_price(price("19.990")).is_ok());
        assert!(validate_price(price("9999999999.99")).is_ok());
        assert!(matches!(
            validate_price(price("19.999")),
            Err(ProductError::InvalidPrice(_))
        ));
        assert!(matches!(
            validate_price(price("10000000000")),
            Err(ProductError::InvalidPrice(_))
        ));
        assert!(NewProduct::new("Lamp", "", price("0.001")).validate().is_err());
    }

    #[test]
    fn test_new_product_requires_name() {
        let new = NewProduct::new("   ", "desc", Decimal::ONE);
        assert!(matches!(new.validate(), Err(ProductError::Validation(_))));
        assert!(NewProduct::new("Lamp", "", Decimal::ZERO).validate().is_ok());
    }
}
