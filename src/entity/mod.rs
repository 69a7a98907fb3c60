pub mod audit_logs;
pub mod cart_lines;
pub mod carts;
pub mod favorites;
pub mod product_variants;
pub mod products;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use cart_lines::Entity as CartLines;
pub use carts::Entity as Carts;
pub use favorites::Entity as Favorites;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use users::Entity as Users;
