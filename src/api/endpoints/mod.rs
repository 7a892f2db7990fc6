//! API endpoint handlers.
//!
//! Handlers parse the request, then hand the work to `CoreState` on the
//! blocking pool through `ApiContext::run`.

pub mod documents;
pub mod health;
pub mod search;
pub mod suggestions;
