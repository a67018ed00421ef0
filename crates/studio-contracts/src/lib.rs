pub mod errors;
pub mod events;
pub mod history;
pub mod models;
pub mod session;
pub mod settings;
pub mod types;

pub use errors::{StudioError, StudioResult};
pub use history::HistoryStore;
pub use types::{DataUrl, EnhancementOptions, HistoryItem, Language, OperationType, UpscaleFactor};
