pub mod commands;
pub mod hub;
pub mod locations;
pub mod logger;
pub mod midi;
pub mod processor;
