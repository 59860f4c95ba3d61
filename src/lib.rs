pub mod analyzers;
pub mod config;
pub mod export;
pub mod graph;
pub mod model;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod routing;
pub mod stats;
pub mod store;
