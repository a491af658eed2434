//! Prompt assembly for flow steps.

mod assembler;

pub use assembler::{
    AssembledPrompt, PromptAssembler, RetrievedExcerpt, CONTEXT_CLOSE, CONTEXT_HEADING,
    CONTEXT_OPEN, REFERENCE_CLOSE, REFERENCE_HEADING, REFERENCE_OPEN,
};
