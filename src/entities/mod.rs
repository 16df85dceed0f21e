pub mod play_history;
pub mod play_records;

pub use play_history as play_history_entity;
pub use play_records as play_record_entity;
