pub mod gateway;
pub mod rest;

pub use gateway::Bot;
pub use rest::{DiscordRest, RoleGrantClient};
