pub mod correction;
pub mod handlers;
pub mod pdf;
pub mod prompts;
