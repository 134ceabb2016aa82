pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};
