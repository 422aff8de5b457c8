pub mod anthropic;
pub mod http;
