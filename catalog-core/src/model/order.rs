use serde::{Deserialize, Serialize};

use crate::record::Record;

/// A quantity of one product within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: i64,
    pub quantity: i32,
}

/// An order placed by a user.
///
/// `user_id` and each line's `product_id` are informal references; they are
/// stored as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: i64,
    pub user_id: i64,
    pub products: Vec<OrderLine>,
    pub total_amount: f64,
}

impl Record for Order {
    fn collection_name() -> &'static str {
        "orders"
    }
}
