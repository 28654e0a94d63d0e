pub mod action;
pub mod recipe;
pub mod step;
pub mod step_ctx;

pub use action::{Action, Condition};
pub use recipe::{
    ExtractionRecipe, RecipeFailure, RecipeFailureKind, RecipeOutcome, RecipeState, RecipeStatus,
};
pub use step::{NavigationStep, StepOutcome, StepPolicy, StepRun};
pub use step_ctx::StepContext;
