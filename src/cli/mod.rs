//! CLI argument parsing

pub mod args;

pub use args::{Args, BeansFormat, Command, LogFormat, NameFormat, Shell, WideFormat};
