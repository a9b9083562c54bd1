//! Item identifiers.
//!
//! The consumer never looks inside an item id: numeric keys, strings and
//! composite keys all work. Anything that can be cloned, compared and logged
//! is an [`ItemId`] through the blanket impl.

use std::fmt::Debug;

/// Opaque identifier of a queued item.
pub trait ItemId: Clone + Eq + Debug + Send + Sync + 'static {}

impl<T> ItemId for T where T: Clone + Eq + Debug + Send + Sync + 'static {}
