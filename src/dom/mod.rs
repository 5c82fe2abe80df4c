pub mod node;
pub mod observer;

pub use node::*;
pub use observer::*;
