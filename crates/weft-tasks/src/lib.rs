//! Concrete datum and task variants for the weft DAG engine.
//!
//! - [`ValueDatum`] / [`FileDatum`]: in-memory and filesystem handles
//! - [`FnTask`]: closure-bodied tasks for pure computation
//! - [`CmdTask`]: shell commands with file outputs

mod cmd;
mod file;
mod func;
mod value;

pub use cmd::CmdTask;
pub use file::FileDatum;
pub use func::FnTask;
pub use value::{ValueDatum, arg_value};
