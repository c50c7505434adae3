mod breaker;
mod capture_flow;
mod config;
mod suggestions;
