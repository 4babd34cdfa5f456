pub mod config;
pub mod detection_core;
pub mod simulator;
