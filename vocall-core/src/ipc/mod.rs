//! Engine-to-UI signal types.

pub mod events;
