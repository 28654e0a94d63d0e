pub mod artifact_sink;
pub mod checkpoint_store;
pub mod download_capture;
pub mod session;

pub use artifact_sink::{ArtifactSink, ManifestSink, NoopSink};
pub use checkpoint_store::{CheckpointStore, JsonCheckpointStore};
pub use download_capture::{DownloadCapture, ExpectedArtifact};
pub use session::{
    ChromeSessionFactory, ProfileLeases, Session, SessionFactory, SessionStatus, WorkspaceLayout,
};
