//! `eventhire-catalog` — rentable products and their stock.

pub mod product;

pub use product::{
    AdjustStock, CreateProduct, OpenIncidentQuery, Product, ProductCategory, ProductCommand,
    ProductCreated, ProductEvent, ProductId, ProductStatus, RetireProduct, StockAdjusted,
    StockMovementReason, UpdateProduct,
    ensure_no_open_incidents,
};
