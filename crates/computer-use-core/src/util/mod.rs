//! Utility modules for host process execution and capture scratch files

pub mod mock_runner;
pub mod process;
pub mod temp_png;
