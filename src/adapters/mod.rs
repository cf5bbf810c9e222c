//! Adapters for the external collaborator ports
//!
//! - `processor`: simulated settlement processor
//! - `notifier`: log-backed notification port
//! - `events`: channel-backed "transfer created" publisher and its listener

pub mod events;
pub mod notifier;
pub mod processor;

pub use events::{spawn_event_listener, ChannelEventPublisher};
pub use notifier::LoggingNotifier;
pub use processor::SimulatedProcessor;
