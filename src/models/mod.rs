pub mod document;
pub mod enums;
pub mod risk;
pub mod rule;

pub use document::*;
pub use risk::*;
pub use rule::*;
