pub mod config;
pub mod detector;
pub mod error;
pub mod feed;
pub mod history;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod publisher;
pub mod sink;
