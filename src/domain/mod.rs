pub mod control;
pub mod log;
pub mod player;
pub mod team;

pub use control::*;
pub use log::*;
pub use player::*;
pub use team::*;
