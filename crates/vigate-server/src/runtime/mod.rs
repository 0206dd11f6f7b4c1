pub mod data_space;
pub mod engine;
pub mod template;

pub use data_space::DataSpace;
pub use engine::{ComponentHandle, ExecutionEngine, MethodHandle, RunCompletion};
pub use template::TemplateEngine;
