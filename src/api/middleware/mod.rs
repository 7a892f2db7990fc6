//! API middleware. Every route except the health probe runs behind
//! [`principal::require_principal`].

pub mod principal;
