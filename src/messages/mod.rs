pub mod storage;
pub mod types;

pub use storage::ConversationHistory;
pub use types::{ConversationTurn, PendingSubmission, Role, Utterance, WireMessage};
