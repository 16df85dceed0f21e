pub mod claim_authority;
pub mod envelope;
pub mod offer_catalog;

pub use claim_authority::*;
pub use envelope::*;
pub use offer_catalog::*;
