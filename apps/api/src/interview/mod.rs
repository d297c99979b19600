pub mod conversation;
pub mod feedback;
pub mod handlers;
pub mod interviewer;
pub mod phases;
pub mod prompts;
pub mod workflow;
