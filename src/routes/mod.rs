pub mod attempt;
pub mod category;
pub mod document;
pub mod quiz;
pub mod user;
