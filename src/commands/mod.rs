pub mod completions;
pub mod config;
pub mod doctor;
pub mod room;
pub mod voices;
