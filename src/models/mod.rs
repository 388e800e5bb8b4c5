pub mod options;

pub use options::{CompileOptions, RenderOptions, UbarsOptions};
