//! Engine configuration: YAML types, env-var substituting parser, and
//! semantic validation.

pub mod parser;
pub mod types;
pub mod validator;
