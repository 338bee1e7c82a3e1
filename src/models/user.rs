use serde::{Deserialize, Serialize};

/// The kind of account a user holds in the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// A retailer browsing the shared catalog.
    Lojista,
    /// A manufacturer publishing products to the catalog.
    Fabricante,
    /// Platform staff.
    Admin,
}

impl UserRole {
    /// Parses the role stored in the user's metadata.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lojista" => Some(UserRole::Lojista),
            "fabricante" => Some(UserRole::Fabricante),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }

    /// The landing route for this role.
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            UserRole::Lojista => "/lojista",
            UserRole::Fabricante => "/fabricante",
            UserRole::Admin => "/admin",
        }
    }
}
