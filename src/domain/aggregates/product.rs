//! Product Aggregate
//!
//! Only the fields the storefront backend reads: pricing lives on the order
//! lines, so a product here is mostly a stock counter with a description.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    price: f64,
    #[serde(default)]
    stock: i64,
    #[serde(default)]
    sub_category: String,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self { id: id.into(), name: name.into(), description: String::new(), price, stock: 0, sub_category: String::new() }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self { self.description = description.into(); self }
    pub fn with_stock(mut self, stock: i64) -> Self { self.stock = stock; self }
    pub fn with_sub_category(mut self, sub_category: impl Into<String>) -> Self { self.sub_category = sub_category.into(); self }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn description(&self) -> &str { &self.description }
    pub fn price(&self) -> f64 { self.price }
    pub fn stock(&self) -> i64 { self.stock }
    pub fn sub_category(&self) -> &str { &self.sub_category }

    /// Signed: stock may go negative when orders outrun inventory.
    pub fn adjust_stock(&mut self, delta: i64) { self.stock += delta; }

    /// Plain-text rendering indexed by the assistant's knowledge store.
    pub fn knowledge_text(&self) -> String {
        format!(
            "{}\nDescription: {}\nPrice: {} USD\nStock: {}\nState: {}",
            self.name, self.description, self.price, self.stock, self.sub_category
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_adjustment() {
        let mut p = Product::new("P1", "Figure", 10.0).with_stock(1);
        p.adjust_stock(-2);
        assert_eq!(p.stock(), -1);
        p.adjust_stock(3);
        assert_eq!(p.stock(), 2);
    }

    #[test]
    fn test_knowledge_text() {
        let p = Product::new("P1", "Figure", 12.5).with_description("Limited run").with_stock(3).with_sub_category("Pre-order");
        assert_eq!(p.knowledge_text(), "Figure\nDescription: Limited run\nPrice: 12.5 USD\nStock: 3\nState: Pre-order");
    }
}
