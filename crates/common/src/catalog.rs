//! Catalog records.

use serde::{Deserialize, Serialize};

use crate::{CategoryId, Money, ProductId};

/// A sellable product with its stock count.
///
/// `in_stock` is a denormalized cache of `stock > 0`; stores rewrite it on
/// every stock change. Use [`Product::with_stock`] rather than assigning
/// `stock` directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    pub in_stock: bool,
    pub category_id: Option<CategoryId>,
    pub image: Option<String>,
}

impl Product {
    /// Creates a product with no category or image.
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            stock,
            in_stock: stock > 0,
            category_id: None,
            image: None,
        }
    }

    pub fn with_category(mut self, category_id: impl Into<CategoryId>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Sets the stock count and refreshes `in_stock`.
    pub fn with_stock(mut self, stock: u32) -> Self {
        self.set_stock(stock);
        self
    }

    pub fn set_stock(&mut self, stock: u32) {
        self.stock = stock;
        self.in_stock = stock > 0;
    }
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

impl Category {
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
