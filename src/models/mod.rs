pub mod common;
pub mod offer;
pub mod pagination;
pub mod play_record;
pub mod reward;

pub use common::*;
pub use offer::*;
pub use pagination::*;
pub use play_record::*;
pub use reward::*;
