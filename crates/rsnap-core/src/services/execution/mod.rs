pub mod command_builder;
pub mod stats_parser;
pub mod worker;
