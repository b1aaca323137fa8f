mod handler;
pub(crate) mod model;

pub use handler::{
    upload,
    list_documents,
    download,
    delete_document,
    generate_quiz
};
