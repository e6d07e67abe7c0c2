#![deny(clippy::all, clippy::pedantic, clippy::nursery, dead_code)]

pub mod bot;
pub mod health;
pub mod sink;
pub mod types;
pub mod worker;
