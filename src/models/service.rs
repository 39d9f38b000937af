use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub price: Decimal,
    pub description: String,
    pub category: String,
    pub active: bool,
}
