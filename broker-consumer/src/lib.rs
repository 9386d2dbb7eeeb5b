mod member;
mod reader;

pub use member::ConsumerGroupMember;
pub use reader::{Handler, HandlerError};
