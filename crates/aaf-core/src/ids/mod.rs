//! Identifier types and the byte-order conversions between their forms.

pub mod auid;
pub mod byteorder;
pub mod mobid;

pub use auid::Auid;
pub use mobid::MobID;
