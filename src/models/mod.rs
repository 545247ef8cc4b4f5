pub mod clan;
pub mod game;
pub mod hook;
pub mod membership;
pub mod player;

pub use clan::*;
pub use game::*;
pub use hook::*;
pub use membership::*;
pub use player::*;
