//! Domain models for the clinic flow engine.

mod conflict;
mod consultation;
mod matching;
mod patient;
mod schedule;
mod session;

pub use conflict::*;
pub use consultation::*;
pub use matching::*;
pub use patient::*;
pub use schedule::*;
pub use session::*;
