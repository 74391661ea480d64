//! Publisher capability seam
//!
//! The flow publishes through a trait object; the twine implementation is
//! the default capability and external ones plug in through the factory.

pub mod capability;
pub mod twine;

// Re-export main types for convenience
pub use capability::{
    instantiate_publisher, ConstructorArgs, FactoryError, Publisher, PublisherFactory,
};
pub use twine::{TwinePublisher, TwinePublisherFactory};
