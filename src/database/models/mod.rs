//! Database model exports.

pub mod house;
pub mod person;

pub use house::{House, HouseRequest};
pub use person::{Person, PersonRequest, Sex};

use chrono::{DateTime, SubsecRound, Utc};

use crate::cache::Identifiable;

/// Current time at millisecond precision, the finest the database keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// A stored entity that is built from, and updated by, a request body.
pub trait Record: Identifiable + Clone + Send + Sync + 'static {
    type Request: Send + Sync + 'static;

    /// Build a new entity with a fresh key and creation timestamps.
    fn from_request(request: Self::Request) -> Self;

    /// Overwrite the request-carried fields, keeping the identity.
    fn apply(&mut self, request: Self::Request);
}
