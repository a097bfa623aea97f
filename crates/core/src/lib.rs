//! Core types, policy resolution, and decision evaluation for the Marquee
//! frequency-capping engine.

pub mod counter;
pub mod decision;
pub mod error;
pub mod event;
pub mod limits;
pub mod policy;

pub use counter::*;
pub use decision::*;
pub use error::{Error, Result};
pub use event::*;
pub use policy::*;
