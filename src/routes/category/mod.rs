mod handler;
pub(crate) mod model;

pub use handler::{
    list_categories,
    create_category
};
