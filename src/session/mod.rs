pub mod state;

pub use state::{Notification, NotificationLevel, PromptTemplate, SessionAction, SessionState};
