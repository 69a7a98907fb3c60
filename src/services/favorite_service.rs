use std::collections::HashSet;

use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, FromQueryResult, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Statement,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::favorites::FavoriteProductList,
    entity::{
        favorites::{Column as FavCol, Entity as Favorites},
        products::{Entity as Products, Relation as ProductRel},
    },
    error::{AppError, AppResult},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::product_service::product_from_entity,
    state::AppState,
};

pub async fn load(state: &AppState, user_id: Uuid) -> AppResult<HashSet<Uuid>> {
    let ids: Vec<Uuid> = Favorites::find()
        .select_only()
        .column(FavCol::ProductId)
        .filter(FavCol::UserId.eq(user_id))
        .into_tuple()
        .all(&state.orm)
        .await?;
    Ok(ids.into_iter().collect())
}

#[derive(Debug, FromQueryResult)]
struct ToggleRow {
    favorited: bool,
}

/// Insert-if-absent else delete. Returns the membership after the toggle.
///
/// Toggles of the same (user, product) pair queue on a transaction-scoped
/// advisory lock, so each one sees the previous one's committed row.
pub async fn toggle(state: &AppState, user_id: Uuid, product_id: Uuid) -> AppResult<bool> {
    if Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .is_none()
    {
        return Err(AppError::validation("product not found"));
    }

    let txn = state.orm.begin().await?;
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1::text), hashtext($2::text))",
        [user_id.into(), product_id.into()],
    ))
    .await?;

    let row = ToggleRow::find_by_statement(Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
        WITH removed AS (
            DELETE FROM favorites
            WHERE user_id = $1 AND product_id = $2
            RETURNING id
        ), inserted AS (
            INSERT INTO favorites (id, user_id, product_id)
            SELECT $3, $1, $2
            WHERE NOT EXISTS (SELECT 1 FROM removed)
            ON CONFLICT (user_id, product_id) DO NOTHING
            RETURNING id
        )
        SELECT EXISTS (SELECT 1 FROM inserted) AS favorited
        "#,
        [user_id.into(), product_id.into(), Uuid::new_v4().into()],
    ))
    .one(&txn)
    .await?
    .ok_or_else(|| AppError::Internal(anyhow::anyhow!("toggle returned no row")))?;
    txn.commit().await?;

    tracing::debug!(user_id = %user_id, product_id = %product_id, favorited = row.favorited, "favorite toggled");
    Ok(row.favorited)
}

pub async fn list_favorites(
    state: &AppState,
    user_id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<FavoriteProductList>> {
    let (page, limit, offset) = pagination.normalize();

    let finder = Products::find()
        .join(JoinType::InnerJoin, ProductRel::Favorites.def())
        .filter(FavCol::UserId.eq(user_id))
        .order_by_desc(FavCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "OK",
        FavoriteProductList { items },
        Some(meta),
    ))
}
