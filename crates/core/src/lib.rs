//! Functional core of the tablestore persistence engine.
//!
//! Pure data types and functions: attribute values, expression builders,
//! the cursor codec, row layout, and the contracts the imperative shell
//! (`tablestore`) implements.

pub mod cursor;
pub mod events;
pub mod expression;
pub mod keys;
pub mod model;
pub mod paging;
pub mod record;
pub mod storage;
pub mod value;

pub use model::Model;
pub use paging::{Page, Pager};
pub use record::{IndexData, VersionStamp};
pub use value::{AttrValue, Item};
