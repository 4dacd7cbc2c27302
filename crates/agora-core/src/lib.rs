//! Core types and trait definitions for the Agora community platform.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the keyspace codec (how every logical entity lands in the single physical
//! table), the entity types, and the [`store::Table`] contract that storage
//! backends implement.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod announcement;
pub mod community;
pub mod connection;
pub mod entity;
pub mod error;
pub mod item;
pub mod keys;
pub mod message;
pub mod store;

pub use error::{Error, Result};
