//! Text collaborators around the confidence verdict
//!
//! - Prompts for the chat model that asks and evaluates interview questions
//! - Markdown cleanup before a reply is handed to text-to-speech

pub mod prompts;
pub mod speech_text;

pub use prompts::{evaluation_prompt, QUESTION_PROMPT};
pub use speech_text::{clean_for_tts, TtsCleaner};
