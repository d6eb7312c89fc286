//! Session and artifact records.

mod artifact;
mod session;

pub use artifact::{Artifact, ArtifactId, ArtifactKind, NewArtifact};
pub use session::{
    LlmSession, NewSession, ParseSessionError, SessionId, SessionStage, SessionStatus,
    SessionUsage, UsageSummary,
};
