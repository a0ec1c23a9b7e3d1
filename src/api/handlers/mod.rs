//! API handlers for sesamo.
//!
//! Auth flows (register, verify, signup, login, logout, session) live under
//! `auth`; `me` is the authenticated profile read; `health` reports store
//! connectivity.

pub mod auth;
pub mod health;
pub mod me;
