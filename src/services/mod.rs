pub mod dispatcher;
pub mod health;
pub mod hook_registry;
pub mod membership;

pub use dispatcher::*;
pub use health::*;
pub use hook_registry::*;
pub use membership::*;
