//! Export of schedule lists to other formats.

pub mod ical;

pub use ical::{default_filename, generate_ical};
