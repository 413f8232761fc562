mod chat;
mod conversations;
mod dispatcher;
mod history;

pub use chat::*;
pub use conversations::*;
pub use dispatcher::*;
pub use history::*;
