mod capability;
mod conversation;
mod generation;
mod history;
mod message;
mod provider;

pub use capability::*;
pub use conversation::*;
pub use generation::*;
pub use history::*;
pub use message::*;
pub use provider::*;
