//! AAF persistence: the object graph as a CFB-backed document (spec §4.5).

pub mod codec;
pub mod file;
pub mod mob;

pub use codec::{
    aux_stream_name, decode_properties, decode_properties_with_aux, encode_properties,
    encode_properties_with_aux, encode_property, encode_property_with_aux,
};
pub use file::{AafFile, WriteOptions};
