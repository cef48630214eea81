// kegsmith-core/src/lib.rs
//! The install pipeline: fetch, isolated runtime, resources, prefix
//! materialization and lifecycle hooks. No console output happens here; progress
//! is reported through [`kegsmith_common::pipeline::PipelineEvent`]s.

pub mod env;
pub mod extract;
pub mod hooks;
pub mod install;
pub mod materialize;
pub mod process;
pub mod receipt;
pub mod resources;
pub mod runtime;

pub use hooks::{caveats, post_install, run_test, AssertionResult, TestReport};
pub use install::{InstallReport, Installer};
pub use receipt::InstallReceipt;
pub use runtime::{PythonVenvProvider, RuntimeHandle, RuntimeProvider};

#[cfg(test)]
pub(crate) mod test_support;
