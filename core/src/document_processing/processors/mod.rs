// Stages that run between text extraction and export

pub mod assembler;
pub mod normalizer;
pub mod prompt;
pub mod validator;

pub use assembler::TableAssembler;
pub use normalizer::{FieldKind, Normalizer};
pub use prompt::{InstructionPayload, PromptBuilder};
pub use validator::ResponseValidator;
