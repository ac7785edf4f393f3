//! Protocol declaration and message framing.
//!
//! A [`Protocol`] names the methods each side answers. Messages exchanged
//! over a connection are [`Message`] values encoded with the crate codec.

mod descriptor;
mod message;
mod path;
mod value_type;

pub use descriptor::{define_method, flatten, MethodDescriptor, MethodTree, Protocol, TreeEntry};
pub use message::Message;
pub use path::split_path;
pub use value_type::{ValidationError, ValueType};

pub(crate) use path::{OnExisting, PathTree};
