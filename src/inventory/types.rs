//! Inventory entities as returned by the API.

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// An entity type served by a CRUD resource.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Resource path relative to the API origin (e.g. "inventory/warehouses")
  const RESOURCE: &'static str;
  /// Human readable name used in error messages
  const NAME: &'static str;
}

/// Storage location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
  #[serde(default)]
  pub uuid: Option<String>,
  pub code: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub address: Option<String>,
  #[serde(default)]
  pub city: Option<String>,
  #[serde(default)]
  pub state_province: Option<String>,
  #[serde(default)]
  pub postal_code: Option<String>,
  #[serde(default)]
  pub country: Option<String>,
  #[serde(default = "default_active")]
  pub active: bool,
  #[serde(default)]
  pub created_at: Option<NaiveDateTime>,
  #[serde(default)]
  pub updated_at: Option<NaiveDateTime>,
}

impl Entity for Warehouse {
  const RESOURCE: &'static str = "inventory/warehouses";
  const NAME: &'static str = "Warehouse";
}

/// Catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  #[serde(default)]
  pub uuid: Option<String>,
  pub code: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub price: f64,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub brand: Option<String>,
  #[serde(default)]
  pub sku: Option<String>,
  #[serde(default = "default_active")]
  pub active: bool,
  #[serde(default)]
  pub created_at: Option<NaiveDateTime>,
  #[serde(default)]
  pub updated_at: Option<NaiveDateTime>,
}

impl Entity for Product {
  const RESOURCE: &'static str = "inventory/products";
  const NAME: &'static str = "Product";
}

/// Quantity of one product held in one warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
  #[serde(default)]
  pub uuid: Option<String>,
  pub product: Product,
  pub warehouse: Warehouse,
  pub quantity: i64,
  #[serde(default)]
  pub min_stock_level: Option<i64>,
  #[serde(default)]
  pub max_stock_level: Option<i64>,
  #[serde(default)]
  pub last_restock_date: Option<NaiveDateTime>,
  #[serde(default)]
  pub created_at: Option<NaiveDateTime>,
  #[serde(default)]
  pub updated_at: Option<NaiveDateTime>,
}

impl Stock {
  pub fn is_low(&self) -> bool {
    self.min_stock_level.is_some_and(|min| self.quantity <= min)
  }

  pub fn is_over(&self) -> bool {
    self.max_stock_level.is_some_and(|max| self.quantity >= max)
  }
}

impl Entity for Stock {
  const RESOURCE: &'static str = "inventory/stocks";
  const NAME: &'static str = "Stock";
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
  pub content: Vec<T>,
  pub total_elements: u64,
  pub total_pages: u32,
  pub size: u32,
  /// Zero-based page index
  pub number: u32,
  pub first: bool,
  pub last: bool,
}

fn default_active() -> bool {
  true
}
