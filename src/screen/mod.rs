pub mod classifier;
pub mod screen_model;
