pub mod fetch;
pub mod filter;
pub mod init_config;
pub mod parse;
pub mod sources;
