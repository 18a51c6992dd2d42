pub mod advisor;
pub mod chat;
pub mod completion;
pub mod constants;
pub mod error;
pub mod panel;
pub mod profile;
pub mod programs;
pub mod protocol;
pub mod session;
pub mod throttle;
pub mod web_server;

pub use advisor::{Advisor, ChatSettings, ChatUpdate, QuickAction};
pub use chat::{project, ChatHistory, Message, Role, Transcript, Turn};
pub use error::AdvisorError;
pub use session::Session;
