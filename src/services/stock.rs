//! Stock adjustment for order lines

use tracing::{debug, instrument, warn};

use crate::domain::aggregates::OrderItem;
use crate::storage::{ProductRepository, StorageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockSign { Decrement, Increment }

impl StockSign {
    fn delta(self, quantity: u32) -> i64 {
        match self {
            Self::Decrement => -i64::from(quantity),
            Self::Increment => i64::from(quantity),
        }
    }
}

/// Applies `sign * quantity` per resolvable line. Lines without a product id
/// or usable quantity, and unknown products, are skipped. Earlier lines stay
/// adjusted when a later one fails.
#[instrument(skip(products, items), fields(lines = items.len()))]
pub async fn apply_delta(products: &dyn ProductRepository, items: &[OrderItem], sign: StockSign) -> StorageResult<u32> {
    let mut adjusted = 0;
    for item in items {
        let (Some(product_id), Some(quantity)) = (item.product_id.as_deref(), item.quantity) else {
            debug!(name = %item.name, "Skipping line without product id or quantity");
            continue;
        };
        if products.adjust_stock(product_id, sign.delta(quantity)).await? {
            adjusted += 1;
        } else {
            warn!(product_id, "Stock adjustment for unknown product");
        }
    }
    Ok(adjusted)
}
