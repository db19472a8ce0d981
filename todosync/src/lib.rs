//! `TodoSync`: real-time synchronization client for collaborative todo lists.
//!
//! The [`channel`] module keeps a push connection per list and fans decoded
//! messages out to subscribers. The [`sync`] coordinator turns those
//! messages into refetches of the [`store`], which reads from the REST
//! backend through [`api`].

pub mod api;
pub mod channel;
pub mod config;
pub mod store;
pub mod sync;
