mod message;
pub mod constants;

pub use message::*;
pub use constants::*;
