pub mod clans;
pub mod games;
pub mod health;
pub mod hooks;
pub mod memberships;
pub mod players;
