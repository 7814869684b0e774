//! Turning state values into stored strings and back.
//!
//! Callers may bring their own parse/serialize pair; otherwise the codec is
//! picked from the runtime type of the default value.

mod codec;

pub(crate) use codec::{ParseFn, SerializeFn};
pub use codec::{Codec, NumberKind, PrimitiveKind};
