pub mod engine;
pub mod memory;
pub mod store;

pub use engine::Poll;
pub use memory::InMemoryPollStore;
pub use store::PollStore;
