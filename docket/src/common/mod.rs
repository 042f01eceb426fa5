mod constants;
pub(crate) mod convertible;
pub mod util;
mod value;

pub use constants::*;
pub use convertible::*;
pub use util::*;
pub use value::*;
