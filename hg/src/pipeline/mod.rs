//! Generation pipeline
//!
//! One turn of structured generation: post an instruction to a thread, run
//! the project's identity over it under a strict schema, poll the run to a
//! terminal state, then extract and validate the reply.

mod extract;
mod generation;
mod run;

pub use extract::{ExtractError, extract_json};
pub use generation::{Generated, GenerationPipeline, GenerationRequest, ThreadBinding};
pub use run::{InstantSleeper, PollPolicy, RunPoller, RunState, Sleeper, TokioSleeper};
