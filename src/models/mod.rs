pub mod account;
pub mod artifact;
pub mod batch_run;
pub mod date_range;
pub mod job;
pub mod loaders;

pub use account::{Account, AccountRegistry};
pub use artifact::{canonical_filename, parse_canonical_filename, Artifact, Platform};
pub use batch_run::{BatchRun, FailureKind, JobFailure, JobRecord, RunStatus};
pub use date_range::DateRange;
pub use job::{Job, JobId, RecipeKind};
pub use loaders::{load_account_registry, parse_account_registry};
