//! crewdeck wire contract types and validation
//!
//! This crate defines the payloads exchanged with the crew backend: the
//! REST resources (crew catalog, activity backlog, configuration text) and
//! the named events and commands carried by the persistent push channel.
//! These types are shared between the REST client, the mock client and the
//! client-side state core.

pub mod error;
pub mod events;
pub mod types;
pub mod validation;

pub use error::*;
pub use events::*;
pub use types::*;
