pub mod config;
pub mod pending;
pub mod shifts;
pub mod signal;
pub mod track;
