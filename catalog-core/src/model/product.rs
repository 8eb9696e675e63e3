use serde::{Deserialize, Serialize};

use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: i64,
    pub name: String,
    pub price: f64,
    pub category: String,
}

impl Record for Product {
    fn collection_name() -> &'static str {
        "products"
    }
}
