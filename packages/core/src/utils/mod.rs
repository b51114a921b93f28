//! Utility functions for the repository core
//!
//! Path algebra for the node hierarchy and small text helpers.

pub mod path;
mod text;

pub use path::{
    child_path, depth, is_descendant_of, is_valid_name, is_valid_path, name_of, normalize,
    parent_of, rebase, validate_name, validate_path, MAX_PATH_LENGTH, ROOT_PATH,
};
pub use text::{crop, strip_tags, CROP_SUFFIX};
