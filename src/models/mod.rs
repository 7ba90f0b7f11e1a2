//! Data models
//!
//! Plain data types shared by the repositories, services and views:
//! - `Category` and the tree helpers built on its preorder numbering
//! - `Entry` and its status
//! - pagination helpers for list pages

mod category;
mod entry;
mod pagination;

pub use category::{category_url, number_tree, Category, TreeChoice, TreePosition, LEVEL_INDICATOR};
pub use entry::{Entry, EntryInput, EntryStatus};
pub use pagination::{PageError, PageInfo, Paginator};
