//! Pixelforge client core.
//!
//! DESIGN
//! ======
//! Two workflows share one session container. Screenshot-to-code keeps a
//! tree of generated versions ([`commits`]) that a [`dispatcher`] fills from
//! a streamed generation. The live editor ([`live_editor`]) chats with an
//! agent that edits a project on disk, showing its text and tool activity in
//! a [`timeline`]. Both talk to the backend over a [`channel`]; the wire
//! types live in the `frames` crate.

pub mod api;
pub mod channel;
pub mod commits;
pub mod config;
pub mod dispatcher;
pub mod identity;
pub mod live_editor;
pub mod selection;
pub mod state;
pub mod storage;
pub mod timeline;
pub mod tools;
