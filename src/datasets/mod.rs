mod karate;
pub use karate::*;

mod utils;
pub use utils::*;
