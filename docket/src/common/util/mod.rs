mod key_utils;
mod type_utils;

pub use key_utils::*;
pub use type_utils::*;
