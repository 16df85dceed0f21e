pub mod claim_service;
pub mod eligibility_service;
pub mod lottery_service;
pub mod play_state_service;
pub mod reward_service;

pub use claim_service::*;
pub use eligibility_service::*;
pub use lottery_service::*;
pub use play_state_service::*;
pub use reward_service::*;
