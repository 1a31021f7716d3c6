#![forbid(unsafe_code)]

//! Self-extracting sh/batch polyglot bundles of one executable plus one
//! content blob.
//!
//! The writer half is [`bundle::write_bundle`]. A payload program finds its
//! content at startup with [`bundle::locate_content`].

pub mod bundle;
