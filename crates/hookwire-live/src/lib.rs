//! Live request list reconciliation
//!
//! [`LiveList`] merges a fetched snapshot of an endpoint's requests with the
//! records arriving on its live stream. Every change goes through
//! [`LiveList::apply`], so the merge rules can be exercised without any
//! rendering layer.

pub mod action;
pub mod filter;
pub mod list;

pub use action::{Action, Applied, StreamTag};
pub use filter::Filter;
pub use list::{LiveList, DEFAULT_CAPACITY};
