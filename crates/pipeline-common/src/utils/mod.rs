//! Small stateless helpers shared by pipeline stages.

mod files;

pub use files::{expand_filename_template, expand_path_template, expand_path_template_at, sanitize_filename};
