use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, DbBackend, EntityTrait,
    FromQueryResult, QueryFilter, Set, Statement,
};
use uuid::Uuid;

use crate::{
    entity::{
        cart_lines::{
            ActiveModel as LineActive, Column as LineCol, Entity as CartLines, Model as LineModel,
        },
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        product_variants::{Column as VariantCol, Entity as ProductVariants},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    models::{Cart, CartLine, CartLineView, LineKey, LineProduct, Owner},
    state::AppState,
};

/// Attempts of the read-then-create sequence in [`get_or_create_cart`].
const CREATE_ATTEMPTS: usize = 2;

fn owner_condition(owner: &Owner) -> Condition {
    match owner {
        Owner::User(id) => Condition::all().add(CartCol::UserId.eq(*id)),
        Owner::Anonymous(id) => Condition::all().add(CartCol::SessionId.eq(*id)),
    }
}

pub async fn find_cart(state: &AppState, owner: &Owner) -> AppResult<Option<Cart>> {
    let cart = Carts::find()
        .filter(owner_condition(owner))
        .one(&state.orm)
        .await?
        .map(cart_from_entity);
    Ok(cart)
}

/// Find-then-create. The unique indexes on `carts.user_id` and
/// `carts.session_id` reject a concurrent duplicate, in which case the winner's
/// cart is re-read.
pub async fn get_or_create_cart(state: &AppState, owner: &Owner) -> AppResult<Cart> {
    let mut last_err = None;
    for _ in 0..CREATE_ATTEMPTS {
        if let Some(cart) = find_cart(state, owner).await? {
            return Ok(cart);
        }

        let created = CartActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner.user_id()),
            session_id: Set(owner.session_id()),
            created_at: NotSet,
        }
        .insert(&state.orm)
        .await;

        match created {
            Ok(model) => {
                tracing::debug!(owner = %owner, cart_id = %model.id, "cart created");
                return Ok(cart_from_entity(model));
            }
            Err(err) => {
                let err = AppError::from(err);
                if !err.is_conflict() {
                    return Err(err);
                }
                tracing::debug!(owner = %owner, "cart creation raced, re-fetching");
                last_err = Some(err);
            }
        }
    }

    let err = last_err.unwrap_or_else(|| AppError::Conflict("cart creation".into()));
    tracing::warn!(owner = %owner, error = %err, operation = "get_or_create_cart", "giving up");
    Err(err)
}

#[derive(Debug, FromQueryResult)]
struct LineRow {
    id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    name: String,
    unit_price: i64,
    image_url: Option<String>,
}

pub async fn list_lines(state: &AppState, cart_id: Uuid) -> AppResult<Vec<CartLineView>> {
    let rows = LineRow::find_by_statement(Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
        SELECT cl.id, cl.product_id, cl.variant_id, cl.quantity,
               CASE WHEN v.id IS NULL THEN p.name ELSE p.name || ' - ' || v.name END AS name,
               COALESCE(v.price, p.price) AS unit_price,
               p.image_url
        FROM cart_lines cl
        JOIN products p ON p.id = cl.product_id
        LEFT JOIN product_variants v ON v.id = cl.variant_id
        WHERE cl.cart_id = $1
        ORDER BY cl.created_at, cl.id
        "#,
        [cart_id.into()],
    ))
    .all(&state.orm)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CartLineView {
            id: row.id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            quantity: row.quantity,
            product: LineProduct {
                name: row.name,
                unit_price: row.unit_price,
                image_url: row.image_url,
            },
        })
        .collect())
}

pub async fn get_line(state: &AppState, line_id: Uuid) -> AppResult<CartLine> {
    CartLines::find_by_id(line_id)
        .one(&state.orm)
        .await?
        .map(line_from_entity)
        .ok_or(AppError::NotFound)
}

pub async fn add_line(
    state: &AppState,
    cart_id: Uuid,
    key: LineKey,
    quantity: i32,
) -> AppResult<CartLine> {
    validate_quantity(quantity)?;
    ensure_product(state, key).await?;

    // The unique (cart_id, product_id, variant_id) constraint makes the
    // increment-or-insert a single statement. An increment that would leave
    // the int4 range updates nothing and returns no row.
    let line = CartLines::find()
        .from_raw_sql(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO cart_lines (id, cart_id, product_id, variant_id, quantity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ON CONSTRAINT cart_lines_cart_product_variant_key
            DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity
            WHERE cart_lines.quantity <= 2147483647 - EXCLUDED.quantity
            RETURNING id, cart_id, product_id, variant_id, quantity, created_at
            "#,
            [
                Uuid::new_v4().into(),
                cart_id.into(),
                key.product_id.into(),
                key.variant_id.into(),
                quantity.into(),
            ],
        ))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::validation("quantity exceeds the maximum for a cart line"))?;

    Ok(line_from_entity(line))
}

pub async fn set_line_quantity(
    state: &AppState,
    line_id: Uuid,
    quantity: i32,
) -> AppResult<Option<CartLine>> {
    if quantity <= 0 {
        remove_line(state, line_id).await?;
        return Ok(None);
    }

    let existing = CartLines::find_by_id(line_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: LineActive = existing.into();
    active.quantity = Set(quantity);
    let line = active.update(&state.orm).await?;
    Ok(Some(line_from_entity(line)))
}

pub async fn remove_line(state: &AppState, line_id: Uuid) -> AppResult<()> {
    let result = CartLines::delete_by_id(line_id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub async fn move_line(state: &AppState, line_id: Uuid, cart_id: Uuid) -> AppResult<CartLine> {
    let existing = CartLines::find_by_id(line_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: LineActive = existing.into();
    active.cart_id = Set(cart_id);
    let line = active.update(&state.orm).await?;
    Ok(line_from_entity(line))
}

pub async fn clear_cart(state: &AppState, cart_id: Uuid) -> AppResult<()> {
    let result = CartLines::delete_many()
        .filter(LineCol::CartId.eq(cart_id))
        .exec(&state.orm)
        .await?;
    tracing::debug!(cart_id = %cart_id, removed = result.rows_affected, "cart cleared");
    Ok(())
}

pub async fn delete_cart(state: &AppState, cart_id: Uuid) -> AppResult<()> {
    let result = Carts::delete_by_id(cart_id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub fn validate_quantity(quantity: i32) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::validation("quantity must be greater than 0"));
    }
    Ok(())
}

async fn ensure_product(state: &AppState, key: LineKey) -> AppResult<()> {
    if Products::find_by_id(key.product_id)
        .one(&state.orm)
        .await?
        .is_none()
    {
        return Err(AppError::validation("product not found"));
    }

    if let Some(variant_id) = key.variant_id {
        let variant = ProductVariants::find_by_id(variant_id)
            .filter(VariantCol::ProductId.eq(key.product_id))
            .one(&state.orm)
            .await?;
        if variant.is_none() {
            return Err(AppError::validation("variant does not belong to product"));
        }
    }
    Ok(())
}

fn cart_from_entity(model: CartModel) -> Cart {
    Cart {
        id: model.id,
        user_id: model.user_id,
        session_id: model.session_id,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn line_from_entity(model: LineModel) -> CartLine {
    CartLine {
        id: model.id,
        cart_id: model.cart_id,
        product_id: model.product_id,
        variant_id: model.variant_id,
        quantity: model.quantity,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert!(matches!(validate_quantity(0), Err(AppError::Validation(_))));
        assert!(matches!(validate_quantity(-3), Err(AppError::Validation(_))));
        assert!(validate_quantity(1).is_ok());
    }
}
