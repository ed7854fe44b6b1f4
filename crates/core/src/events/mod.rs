mod error;
mod traits;
mod types;

pub use error::{PublishError, Result};
pub use traits::EventPublisher;
pub use types::{DomainEvent, EventBuffer};
