//! Product lifecycle status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The lifecycle status of a product row.
///
/// Legal transitions:
/// ```text
/// Pending ──► Active ──► Deleting ──► (removed)
///    │          ▲           │
///    │          └───────────┘  rollback
///    └──► (removed)  rollback
/// ```
///
/// A deleted product is a removed row, never a status value. Stores guard
/// each transition on the exact status it leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    /// Inserted while the image is being stored; not visible in the catalog.
    Pending,

    /// Fully created.
    Active,

    /// Delete in progress while the image is being removed.
    Deleting,
}

impl ProductStatus {
    /// Returns the status as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Pending => "pending",
            ProductStatus::Active => "active",
            ProductStatus::Deleting => "deleting",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProductStatus::Pending),
            "active" => Ok(ProductStatus::Active),
            "deleting" => Ok(ProductStatus::Deleting),
            other => Err(format!("unknown product status '{other}'")),
        }
    }
}
