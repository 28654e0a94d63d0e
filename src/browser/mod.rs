pub mod launcher;
pub mod script;

pub use launcher::{launch_profile_browser, LaunchOptions};
