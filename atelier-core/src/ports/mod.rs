//! Trait boundaries for the three external collaborators this crate treats
//! as interfaces only: the message bus (C1), the repository (C2), and the
//! artifact store (C3). Each port has exactly one concrete adapter in this
//! workspace; production deployments may supply others.

mod artifact_store;
mod message_bus;
mod repository;

pub use artifact_store::{ArtifactKind, ArtifactStore};
pub use message_bus::{DeliveredMessage, MessageBus};
pub use repository::{AddOutcome, Repository};
