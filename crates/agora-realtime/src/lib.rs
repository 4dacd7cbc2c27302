//! The real-time messaging core of Agora.
//!
//! - [`guard::MembershipGuard`] answers "may this user act in this community".
//! - [`registry::ConnectionRegistry`] tracks open sessions in the shared table.
//! - [`fanout::MessageFanout`] persists a chat message and pushes it to every
//!   joined session through a [`transport::Delivery`].
//! - [`announcements::AnnouncementStore`] and [`directory::Directory`] cover
//!   the community-scoped records the core reads for authorization.
//! - [`gateway::Gateway`] maps wire frames ([`protocol`]) onto the above.
//!
//! Everything is generic over [`agora_core::store::Table`]; nothing here
//! keeps per-session state in memory.

pub mod announcements;
pub mod directory;
pub mod error;
pub mod fanout;
pub mod gateway;
pub mod guard;
pub mod protocol;
pub mod registry;
pub mod sanitize;
pub mod transport;

pub use error::{Error, Result};

#[cfg(test)]
mod testing;
