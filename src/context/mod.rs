//! Context storage
//!
//! `ContextStore` owns the personal context tree. It is a plain data
//! component: the gatekeeper is the only caller on the request path.

mod store;

pub use store::{deep_merge, ContextStore, WILDCARD};
