pub mod item;

pub use item::{canonical_url, DiscoveredItem, Item, ItemStatus, PLACEHOLDER_TITLE};
