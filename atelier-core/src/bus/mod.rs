mod memory;

pub use memory::InMemoryMessageBus;
