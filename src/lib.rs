pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod range;
pub mod run;
pub mod stats;
pub mod streaks;
