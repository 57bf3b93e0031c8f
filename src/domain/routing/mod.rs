//! Deterministic routing rules. The router itself lives in the
//! application layer because it may fall back to a classifier.

mod rules;

pub use rules::{
    is_exit_command, is_resume_command, match_rules, workflow_for_selection, KeywordRule,
    StartIntent, RESUME_ID, RULES,
};
