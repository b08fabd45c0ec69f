//! Domain models for the checkout backend.
//!
//! Row types map one-to-one onto the tables in `migrations/`; snapshot and
//! detail types are computed per request and never stored.

pub mod cart;
pub mod order;
pub mod stock;

pub use cart::{CartLine, CartLineSnapshot};
pub use order::{
    NewOrder, NewOrderLine, Order, OrderDetail, OrderLine, OrderStatus, OrderSummary, ShippingInfo,
};
pub use stock::{SkuStock, StockUpdate};

pub type SkuId = i64;
pub type ProductId = i64;
pub type CartId = i64;
pub type CartLineId = i64;
pub type UserId = i64;
pub type OrderId = i64;
pub type OrderLineId = i64;
