// Mee6 leaderboard API client, used by the level import.

pub mod mee6_client;

pub use mee6_client::{Mee6Client, MEE6_API_URL};
