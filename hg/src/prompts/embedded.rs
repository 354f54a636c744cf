//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// First generation of an artifact
pub const ARTIFACT: &str = include_str!("../../prompts/artifact.pmt");

/// Model-driven change of an existing artifact
pub const CHANGE: &str = include_str!("../../prompts/change.pmt");

/// Persona for one customer segment
pub const PERSON_PROFILE: &str = include_str!("../../prompts/person-profile.pmt");

/// One additional content idea for a detailed channel
pub const CONTENT_IDEA: &str = include_str!("../../prompts/content-idea.pmt");

/// Default identity instructions, parameterized by the project title
pub const IDENTITY: &str = include_str!("../../prompts/identity.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "artifact" => Some(ARTIFACT),
        "change" => Some(CHANGE),
        "person-profile" => Some(PERSON_PROFILE),
        "content-idea" => Some(CONTENT_IDEA),
        "identity" => Some(IDENTITY),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
