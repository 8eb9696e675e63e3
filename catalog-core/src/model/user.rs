use serde::{Deserialize, Serialize};

use crate::record::Record;

/// A customer of the shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub address: String,
}

impl Record for User {
    fn collection_name() -> &'static str {
        "users"
    }
}
