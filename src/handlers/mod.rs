pub mod rewards;

pub use rewards::rewards_config;
