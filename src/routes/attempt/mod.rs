mod handler;
pub(crate) mod model;

pub use handler::{
    start_attempt,
    submit_attempt,
    my_attempts
};
