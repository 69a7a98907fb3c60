use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Cart, CartLineView};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AddLineRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SetQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub cart: Option<Cart>,
    pub lines: Vec<CartLineView>,
    pub item_count: i64,
    pub subtotal: i64,
}

impl CartView {
    pub fn new(cart: Option<Cart>, lines: Vec<CartLineView>) -> Self {
        let item_count = lines.iter().map(|l| i64::from(l.quantity)).sum();
        let subtotal = lines.iter().map(CartLineView::line_total).sum();
        Self {
            cart,
            lines,
            item_count,
            subtotal,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MergeResponse {
    pub moved: usize,
    pub combined: usize,
    pub failed: usize,
    pub lines: Vec<CartLineView>,
}
