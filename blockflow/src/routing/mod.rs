//! Envelope-routing adapters.
//!
//! This module provides:
//! - [`RoutingAdapter`], one implementation of the adapter contract
//! - Five [`Route`]s deciding what an adapter forwards
//! - `link_to_*` functions that create and link an adapter in one call
//!
//! An adapter accepts offers only from its bound upstream. A bad header, a
//! missing source, or a foreign source is returned as an error, which the
//! offering block treats as fatal.

mod adapter;
mod links;
mod routes;

pub use adapter::{Route, RoutingAdapter};
pub use links::{
    link_to_error, link_to_next, link_to_next_discard_error, link_to_transform_error,
    link_to_transform_next, RouteOptions,
};
pub use routes::{
    DiscardErrorRoute, ErrorRoute, Projection, SuccessRoute, TransformErrorRoute,
    TransformSuccessRoute,
};
