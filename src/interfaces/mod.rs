//! Adapters between the processing core and the outside world.

pub mod csv;
