pub mod messages;
pub mod middleware;
pub mod state;
