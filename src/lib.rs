pub mod animator;
pub mod cli;
pub mod config;
pub mod params;
pub mod record;
pub mod render;
pub mod serial_link;
pub mod snapshot;
