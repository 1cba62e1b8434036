mod health;
mod monitoring;
pub mod swagger;

pub use health::{health, version};
pub use monitoring::monitoring;
