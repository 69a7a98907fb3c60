use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddLineRequest, CartView, MergeResponse, SetQuantityRequest},
        favorites::{FavoriteIds, FavoriteProductList, ToggleFavoriteResponse},
        products::{CreateProductRequest, CreateVariantRequest, ProductList, UpdateProductRequest},
    },
    models::{
        Cart, CartLine, CartLineView, Favorite, LineProduct, Owner, Product, ProductVariant,
        ProductWithVariants, User,
    },
    response::{ApiResponse, ErrorData, Meta},
    routes::{auth, cart, favorites, health, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness,
        auth::login,
        auth::register,
        cart::get_cart,
        cart::add_line,
        cart::set_line_quantity,
        cart::remove_line,
        cart::clear_cart,
        cart::merge_cart,
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product,
        favorites::list_favorites,
        favorites::favorite_ids,
        favorites::toggle_favorite
    ),
    components(
        schemas(
            User,
            Product,
            ProductVariant,
            ProductWithVariants,
            Owner,
            Cart,
            CartLine,
            CartLineView,
            LineProduct,
            Favorite,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            AddLineRequest,
            SetQuantityRequest,
            CartView,
            MergeResponse,
            FavoriteIds,
            FavoriteProductList,
            ToggleFavoriteResponse,
            CreateProductRequest,
            CreateVariantRequest,
            UpdateProductRequest,
            ProductList,
            params::Pagination,
            params::ProductQuery,
            Meta,
            ErrorData,
            ApiResponse<CartView>,
            ApiResponse<ProductList>,
            ApiResponse<ProductWithVariants>,
            ApiResponse<FavoriteIds>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Cart", description = "Cart endpoints for signed-in and anonymous shoppers"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Favorites", description = "Favorite endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
