pub mod fields;
pub mod http_helpers;
pub mod logger;
