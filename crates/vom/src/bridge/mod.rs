//! Host types carried as wire types.
//!
//! A [`Native`] type is not described field by field. It converts to and
//! from a dedicated wire type, and the registry records it as the preferred
//! host representation of that wire type's name.

mod error;
mod time;

pub use error::{RemoteError, RetryCode};
pub use time::{format_rfc3339, parse_rfc3339, WireDuration, WireTime};

use crate::error::ConversionError;
use crate::registry::Vdl;

/// A host type with a wire representation of type `Wire`.
pub trait Native: Sized + Send + 'static {
    type Wire: Vdl;

    fn to_wire(&self) -> Self::Wire;

    fn from_wire(wire: Self::Wire) -> Result<Self, ConversionError>;
}

/// Implements [`Vdl`](crate::registry::Vdl) for a [`Native`] type through
/// its wire type.
#[macro_export]
macro_rules! native_vdl {
    ($ty:ty) => {
        impl $crate::registry::Vdl for $ty {
            fn describe(
                d: &mut $crate::registry::Describer,
            ) -> ::std::result::Result<$crate::model::TypeRef, $crate::error::TypeError> {
                d.native::<Self>()
            }

            fn to_value(&self) -> $crate::model::Value {
                $crate::registry::Vdl::to_value(&$crate::bridge::Native::to_wire(self))
            }

            fn from_value(
                value: $crate::model::Value,
            ) -> ::std::result::Result<Self, $crate::error::ConversionError> {
                let wire = <<$ty as $crate::bridge::Native>::Wire as $crate::registry::Vdl>::from_value(value)?;
                <$ty as $crate::bridge::Native>::from_wire(wire)
            }
        }
    };
}

native_vdl!(std::time::SystemTime);
native_vdl!(std::time::Duration);
native_vdl!(RemoteError);
