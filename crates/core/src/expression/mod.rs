mod filter;
mod key_condition;

pub use filter::{CompareOp, FilterBuilder, FilterCondition};
pub use key_condition::{KeyCondition, KeyConditionBuilder, RangeKeyCondition};
