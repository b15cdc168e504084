pub mod timeout;

pub use timeout::{
    enforce_deadline, Deadline, HandlerTimeout, DEFAULT_HANDLER_TIMEOUT, ERROR_PATH_TIMEOUT,
};
