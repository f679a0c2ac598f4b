//! Prompt templates for the annotation and refinement completion calls.

pub mod annotate;
pub mod refine;

pub use annotate::{annotate_user_prompt, single_segment_user_prompt, ANNOTATE_SYSTEM};
pub use refine::{
    dialogue_refine_user_prompt, narrator_refine_user_prompt, DIALOGUE_REFINE_SYSTEM,
    NARRATOR_REFINE_SYSTEM,
};
