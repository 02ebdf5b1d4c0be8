pub mod config;
pub mod debounce;
pub mod engine;
pub mod fingerprint;
pub mod index;
pub mod page;
pub mod report;
pub mod scan;
pub mod watch;
