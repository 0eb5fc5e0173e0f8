pub mod background;
pub mod config;
pub mod edit_repair;
pub mod error;
pub mod feature;
pub mod model;
pub mod registry;
