mod handler;
pub(crate) mod model;

pub use handler::{
    login,
    me,
    register,
    update_profile,
    list_members,
    update_role
};
