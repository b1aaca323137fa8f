mod handler;
pub(crate) mod model;
mod wizard;

pub use handler::{
    list_quizzes,
    quiz_detail,
    assignable_members,
    assign_quiz,
    assigned_quizzes
};
pub use wizard::{
    start_wizard,
    wizard_state,
    update_text,
    generate_questions,
    update_question,
    mark_correct,
    delete_question,
    confirm_questions,
    suggest_categories,
    save_wizard,
    cancel_wizard
};
