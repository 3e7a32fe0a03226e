//! The three channel flavors spec §4.4–§4.6 describe, plus the `Selectable`
//! hooks each implements from [`crate::select`].

pub mod buffered1;
pub mod buffered_n;
pub mod unbuffered;
