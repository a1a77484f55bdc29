//! Share the contents of one directory over HTTP.
//!
//! Every request path goes through [`path_guard`] (decode, join, containment,
//! symlink re-check) and [`policy`] (flat vs. recursive) before [`server`] reads a
//! file or renders a [`listing`].

pub mod config;
pub mod error;
pub mod listing;
pub mod path_guard;
pub mod policy;
pub mod server;
