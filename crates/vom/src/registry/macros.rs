//! Declarative `Vdl` implementations for structs, enums and unions.

/// Implements [`Vdl`](crate::registry::Vdl) for a struct with named fields.
///
/// Each field maps to a wire field name; wire fields are declared in the
/// order listed.
///
/// ```rust
/// # use vom::vdl_struct;
/// struct Entry {
///     key: String,
///     hits: u64,
/// }
///
/// vdl_struct!(Entry = "cache.Entry" { key: String as "Key", hits: u64 as "Hits" });
/// ```
#[macro_export]
macro_rules! vdl_struct {
    ($ty:ident = $name:literal { $($field:ident : $fty:ty as $wire:literal),* $(,)? }) => {
        impl $crate::registry::Vdl for $ty {
            fn describe(
                d: &mut $crate::registry::Describer,
            ) -> ::std::result::Result<$crate::model::TypeRef, $crate::error::TypeError> {
                let p = d.begin::<Self>($crate::model::Kind::Struct, $name);
                $(
                    let field = d.resolve::<$fty>()?;
                    d.builder().add_field(p, $wire, field);
                )*
                Ok(p.into())
            }

            fn to_value(&self) -> $crate::model::Value {
                $crate::model::Value::Struct(vec![
                    $($crate::registry::Vdl::to_value(&self.$field)),*
                ])
            }

            #[allow(unused_mut, unused_variables)]
            fn from_value(
                value: $crate::model::Value,
            ) -> ::std::result::Result<Self, $crate::error::ConversionError> {
                let mut fields = $crate::registry::struct_fields(value)?;
                Ok(Self {
                    $($field: $crate::registry::next_field::<$fty>(&mut fields, $wire, $name)?,)*
                })
            }
        }
    };
}

/// Implements [`Vdl`](crate::registry::Vdl) for a fieldless enum; labels are
/// the variant names.
#[macro_export]
macro_rules! vdl_enum {
    // `match` from each variant to its label index.
    (@index $value:expr, $index:expr, [$($arms:tt)*]) => {
        match $value { $($arms)* }
    };
    (@index $value:expr, $index:expr, [$($arms:tt)*] $variant:ident $($rest:ident)*) => {
        $crate::vdl_enum!(@index $value, $index + 1, [$($arms)* Self::$variant => $index,] $($rest)*)
    };
    ($ty:ident = $name:literal { $($variant:ident),+ $(,)? }) => {
        impl $crate::registry::Vdl for $ty {
            fn describe(
                d: &mut $crate::registry::Describer,
            ) -> ::std::result::Result<$crate::model::TypeRef, $crate::error::TypeError> {
                let p = d.begin::<Self>($crate::model::Kind::Enum, $name);
                $(d.builder().add_label(p, stringify!($variant));)+
                Ok(p.into())
            }

            fn to_value(&self) -> $crate::model::Value {
                $crate::model::Value::Enum($crate::vdl_enum!(@index self, 0usize, [] $($variant)+))
            }

            fn from_value(
                value: $crate::model::Value,
            ) -> ::std::result::Result<Self, $crate::error::ConversionError> {
                let label = $crate::registry::enum_label(value, &[$(stringify!($variant)),+], $name)?;
                $(
                    if label == stringify!($variant) {
                        return Ok(Self::$variant);
                    }
                )+
                Err($crate::error::ConversionError::UnknownLabel {
                    label: label.to_string(),
                    target: $name.to_string(),
                })
            }
        }
    };
}

/// Implements [`Vdl`](crate::registry::Vdl) for an enum whose variants each
/// hold one value; union fields are the variant names.
#[macro_export]
macro_rules! vdl_union {
    // `match` from each variant to its field index and inner value.
    (@index $value:expr, $index:expr, [$($arms:tt)*]) => {
        match $value { $($arms)* }
    };
    (@index $value:expr, $index:expr, [$($arms:tt)*] $variant:ident $($rest:ident)*) => {
        $crate::vdl_union!(@index $value, $index + 1, [
            $($arms)* Self::$variant(inner) => ($index, $crate::registry::Vdl::to_value(inner)),
        ] $($rest)*)
    };
    ($ty:ident = $name:literal { $($variant:ident ( $vty:ty )),+ $(,)? }) => {
        impl $crate::registry::Vdl for $ty {
            fn describe(
                d: &mut $crate::registry::Describer,
            ) -> ::std::result::Result<$crate::model::TypeRef, $crate::error::TypeError> {
                let p = d.begin::<Self>($crate::model::Kind::Union, $name);
                $(
                    let field = d.resolve::<$vty>()?;
                    d.builder().add_field(p, stringify!($variant), field);
                )+
                Ok(p.into())
            }

            fn to_value(&self) -> $crate::model::Value {
                let (index, inner) = $crate::vdl_union!(@index self, 0usize, [] $($variant)+);
                $crate::model::Value::Union(index, Box::new(inner))
            }

            fn from_value(
                value: $crate::model::Value,
            ) -> ::std::result::Result<Self, $crate::error::ConversionError> {
                let (name, inner) =
                    $crate::registry::union_parts(value, &[$(stringify!($variant)),+], $name)?;
                $(
                    if name == stringify!($variant) {
                        return Ok(Self::$variant(<$vty as $crate::registry::Vdl>::from_value(inner)?));
                    }
                )+
                Err($crate::error::ConversionError::UnknownField {
                    field: name.to_string(),
                    target: $name.to_string(),
                })
            }
        }
    };
}
