use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    Statement,
};
use storefront_cart::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{products::Column as ProductCol, Products},
    services::auth_service::hash_password,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin@example.com", "admin12345", "admin").await?;
    let user_id = ensure_user(&orm, "user@example.com", "user12345", "user").await?;
    seed_products(&orm).await?;

    tracing::info!(%admin_id, %user_id, "seed completed");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;
    let row = orm
        .query_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO users (id, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
            RETURNING id
            "#,
            [
                Uuid::new_v4().into(),
                email.into(),
                password_hash.into(),
                role.into(),
            ],
        ))
        .await?
        .ok_or_else(|| anyhow::anyhow!("upsert of {email} returned no row"))?;

    let id: Uuid = row.try_get("", "id")?;
    tracing::info!(email, role, "ensured user");
    Ok(id)
}

async fn seed_products(orm: &DatabaseConnection) -> anyhow::Result<()> {
    let products: [(&str, &str, i64, i32, &[(&str, Option<i64>)]); 4] = [
        (
            "Axum Hoodie",
            "Warm hoodie for Rustaceans",
            550000,
            50,
            &[("S", None), ("M", None), ("XL", Some(600000))],
        ),
        ("Ferris Mug", "Coffee tastes better with Ferris", 120000, 100, &[]),
        ("Rust Sticker Pack", "Decorate your laptop", 50000, 200, &[]),
        (
            "E-book: Async Rust",
            "Learn async Rust patterns",
            250000,
            75,
            &[("PDF", None), ("EPUB", None)],
        ),
    ];

    for (name, desc, price, stock, variants) in products {
        orm.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO products (id, name, description, price, stock, image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO NOTHING
            "#,
            [
                Uuid::new_v4().into(),
                name.into(),
                desc.into(),
                price.into(),
                stock.into(),
                format!("https://cdn.example.com/products/{}.jpg", slug(name)).into(),
            ],
        ))
        .await?;

        let product = Products::find()
            .filter(ProductCol::Name.eq(name))
            .one(orm)
            .await?
            .ok_or_else(|| anyhow::anyhow!("product {name} missing after insert"))?;

        for (variant, variant_price) in variants {
            orm.execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                INSERT INTO product_variants (id, product_id, name, price)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (product_id, name) DO NOTHING
                "#,
                [
                    Uuid::new_v4().into(),
                    product.id.into(),
                    (*variant).into(),
                    (*variant_price).into(),
                ],
            ))
            .await?;
        }
    }

    tracing::info!("seeded products");
    Ok(())
}

fn slug(name: &str) -> String {
    name.chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() => Some(c.to_ascii_lowercase()),
            ' ' | '-' => Some('-'),
            _ => None,
        })
        .collect()
}
