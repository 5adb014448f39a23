pub mod config;
pub mod logger;
pub mod mock_events;
pub mod mock_server;
pub mod report;
pub mod shutdown;
