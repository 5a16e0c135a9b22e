pub mod clock;
pub mod config;
pub mod fetch;
pub mod geo;
pub mod output;
pub mod parser;
pub mod position;
pub mod refresh;
pub mod selector;
