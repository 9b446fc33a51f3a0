pub mod envelope;
pub mod pipeline;
pub mod preprompt;
