pub mod analyzers;
pub mod diagnostics;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod input;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod reference;
pub mod schedule;
