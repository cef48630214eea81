// kegsmith-common/src/model/mod.rs
// Declares the modules within the model directory.

pub mod checksum;
pub mod formula;
pub mod requirement;
pub mod resource;
pub mod steps;
pub mod template;

// Re-export
pub use formula::{Formula, HeadSpec};
pub use requirement::RuntimeRequirement;
pub use resource::ResourceSpec;
pub use steps::{InstallPlan, InstallStep, LauncherSpec, TestAssertion};
pub use template::TemplateVars;
