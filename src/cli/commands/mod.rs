pub mod analyze;
pub mod checkpoint;
pub mod config;
pub mod init;
pub mod maintenance;
