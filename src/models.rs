use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductWithVariants {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<ProductVariant>,
}

/// Who a cart belongs to. A cart has exactly one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Owner {
    User(Uuid),
    Anonymous(Uuid),
}

impl Owner {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Owner::User(id) => Some(*id),
            Owner::Anonymous(_) => None,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Owner::User(_) => None,
            Owner::Anonymous(id) => Some(*id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Owner::Anonymous(_))
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::User(id) => write!(f, "user:{id}"),
            Owner::Anonymous(id) => write!(f, "anon:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Cart {
    pub fn owner(&self) -> Option<Owner> {
        match (self.user_id, self.session_id) {
            (Some(user), None) => Some(Owner::User(user)),
            (None, Some(session)) => Some(Owner::Anonymous(session)),
            _ => None,
        }
    }
}

/// Identity of a line within a cart. Two lines of one cart never share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
}

impl LineKey {
    pub fn new(product_id: Uuid, variant_id: Option<Uuid>) -> Self {
        Self {
            product_id,
            variant_id,
        }
    }
}

/// Sum of two line quantities, rejected when it leaves the `i32` column range.
pub fn combined_quantity(current: i32, extra: i32) -> AppResult<i32> {
    current
        .checked_add(extra)
        .ok_or_else(|| AppError::validation("quantity exceeds the maximum for a cart line"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl CartLine {
    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id, self.variant_id)
    }
}

/// Product display data joined onto a line at read time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LineProduct {
    pub name: String,
    pub unit_price: i64,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub product: LineProduct,
}

impl CartLineView {
    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id, self.variant_id)
    }

    pub fn line_total(&self) -> i64 {
        self.product.unit_price * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Favorite {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}
