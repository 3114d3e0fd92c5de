pub mod constants;
pub mod framer;
pub mod packet;

pub use constants::*;
pub use framer::{Framer, FramerEvent};
pub use packet::{Frame, encode};
