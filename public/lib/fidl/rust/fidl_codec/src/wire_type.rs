// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Typed bindings on top of the dynamic codec.
//!
//! Rust types describe their wire layout through [`WireType`], and are converted
//! to and from [`Value`]s at the edges of encoding and decoding. Structs and enums
//! get their implementations from the [`fidl_struct!`](crate::fidl_struct) and
//! [`fidl_enum!`](crate::fidl_enum) macros.

use {
    crate::{
        encoding::{
            check_handles_released, decode_and_convert, Context, Encoder, TransactionHeader,
        },
        handle::{take_handle, Handle, MessageBuf},
        layout::{PrimitiveKind, Shape},
        value::Value,
        Error, Result,
    },
    std::{convert::TryInto, vec},
};

/// A Rust type with a FIDL wire representation.
pub trait WireType: Sized {
    /// The layout of the type.
    fn shape() -> Shape;

    /// Converts `self` to a dynamic value, moving any handles out of `self`.
    fn take_value(&mut self) -> Value;

    /// Converts a decoded value back into the Rust type.
    fn from_value(value: Value) -> Result<Self>;
}

fn type_mismatch<T: WireType>(found: &Value) -> Error {
    Error::TypeMismatch { expected: T::shape().to_string(), found: found.kind_name() }
}

macro_rules! impl_wire_type_num { ($($prim_ty:ty => $kind:ident,)*) => { $(
    impl WireType for $prim_ty {
        fn shape() -> Shape {
            Shape::Primitive(PrimitiveKind::$kind)
        }

        fn take_value(&mut self) -> Value {
            Value::$kind(*self)
        }

        fn from_value(value: Value) -> Result<Self> {
            match value {
                Value::$kind(v) => Ok(v),
                other => Err(type_mismatch::<Self>(&other)),
            }
        }
    }
)* } }

impl_wire_type_num!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
);

impl<T: WireType, const N: usize> WireType for [T; N] {
    fn shape() -> Shape {
        Shape::Array { element: Box::new(T::shape()), count: N }
    }

    fn take_value(&mut self) -> Value {
        Value::Array(self.iter_mut().map(T::take_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) if items.len() == N => items
                .into_iter()
                .map(T::from_value)
                .collect::<Result<Vec<T>>>()?
                .try_into()
                .map_err(|_| Error::OutOfRange),
            Value::Array(items) => {
                Err(Error::ArrayLengthMismatch { expected: N, actual: items.len() })
            }
            other => Err(type_mismatch::<Self>(&other)),
        }
    }
}

impl WireType for Handle {
    fn shape() -> Shape {
        Shape::Handle { nullable: false }
    }

    fn take_value(&mut self) -> Value {
        Value::Handle(take_handle(self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Handle(handle) if handle.is_invalid() => Err(Error::NotNullable),
            Value::Handle(handle) => Ok(handle),
            other => Err(type_mismatch::<Self>(&other)),
        }
    }
}

impl WireType for Option<Handle> {
    fn shape() -> Shape {
        Shape::Handle { nullable: true }
    }

    fn take_value(&mut self) -> Value {
        Value::Handle(self.take().unwrap_or_else(Handle::invalid))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Handle(handle) if handle.is_invalid() => Ok(None),
            Value::Handle(handle) => Ok(Some(handle)),
            other => Err(type_mismatch::<Self>(&other)),
        }
    }
}

/// Unpacks the fields of a decoded struct. Used by `fidl_struct!`.
#[doc(hidden)]
pub fn take_record_fields(
    value: Value,
    record: &'static str,
    expected: usize,
) -> Result<vec::IntoIter<Value>> {
    match value {
        Value::Record(fields) if fields.len() == expected => Ok(fields.into_iter()),
        Value::Record(fields) => Err(Error::FieldCountMismatch {
            record: record.to_string(),
            expected,
            actual: fields.len(),
        }),
        other => Err(Error::TypeMismatch {
            expected: format!("struct {}", record),
            found: other.kind_name(),
        }),
    }
}

/// Converts the next field of a decoded struct. Used by `fidl_struct!`.
#[doc(hidden)]
pub fn next_field<T: WireType>(fields: &mut vec::IntoIter<Value>) -> Result<T> {
    fields.next().ok_or(Error::OutOfRange).and_then(T::from_value)
}

/// Implements `WireType` for a struct.
///
/// Members are listed in declaration order. Members listed under `skipped` are
/// not serialized and are reset to their `Default` value when decoding.
///
/// ```
/// # use fidl_codec::fidl_struct;
/// #[derive(Debug, PartialEq)]
/// struct Point {
///     x: i32,
///     y: i32,
///     cached_norm: Option<u64>,
/// }
///
/// fidl_struct! {
///     name: Point,
///     members: [
///         x { ty: i32, },
///         y { ty: i32, },
///     ],
///     skipped: [
///         cached_norm,
///     ],
///     align: 4,
/// }
/// ```
#[macro_export]
macro_rules! fidl_struct {
    (
        name: $name:ident,
        members: [$(
            $member_name:ident {
                ty: $member_ty:ty,
            },
        )*],
        $(skipped: [$($skipped_name:ident,)*],)?
        align: $align:expr,
    ) => {
        impl $crate::wire_type::WireType for $name {
            fn shape() -> $crate::layout::Shape {
                $crate::layout::Shape::Record($crate::layout::RecordType::new(
                    stringify!($name),
                    $align,
                    vec![$(
                        $crate::layout::FieldType::new(
                            stringify!($member_name),
                            <$member_ty as $crate::wire_type::WireType>::shape(),
                        ),
                    )*],
                ))
            }

            fn take_value(&mut self) -> $crate::value::Value {
                $crate::value::Value::Record(vec![$(
                    $crate::wire_type::WireType::take_value(&mut self.$member_name),
                )*])
            }

            #[allow(unused_mut, unused_variables)]
            fn from_value(value: $crate::value::Value) -> $crate::Result<Self> {
                let mut fields = $crate::wire_type::take_record_fields(
                    value,
                    stringify!($name),
                    <[&str]>::len(&[$(stringify!($member_name),)*]),
                )?;
                Ok($name {
                    $(
                        $member_name: $crate::wire_type::next_field::<$member_ty>(&mut fields)?,
                    )*
                    $($(
                        $skipped_name: ::std::default::Default::default(),
                    )*)?
                })
            }
        }
    }
}

/// Declares a FIDL enum backed by the primitive `$prim_ty` and implements `WireType` for it.
///
/// Decoding a value that names no declared member fails with `UnknownEnumMember`.
#[macro_export]
macro_rules! fidl_enum {
    ($name:ident ($prim_ty:ident) { $($key:ident = $value:expr,)* }) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[repr($prim_ty)]
        pub enum $name {
            $(
                $key = $value,
            )*
        }

        impl $name {
            pub fn from_primitive(prim: $prim_ty) -> Option<Self> {
                $(
                    if prim == $value {
                        return Some($name::$key);
                    }
                )*
                None
            }

            pub fn into_primitive(self) -> $prim_ty {
                self as $prim_ty
            }
        }

        impl $crate::wire_type::WireType for $name {
            fn shape() -> $crate::layout::Shape {
                <$prim_ty as $crate::wire_type::WireType>::shape()
            }

            fn take_value(&mut self) -> $crate::value::Value {
                $crate::wire_type::WireType::take_value(&mut self.into_primitive())
            }

            fn from_value(value: $crate::value::Value) -> $crate::Result<Self> {
                let prim = <$prim_ty as $crate::wire_type::WireType>::from_value(value)?;
                Self::from_primitive(prim).ok_or($crate::Error::UnknownEnumMember {
                    type_name: stringify!($name),
                    value: prim as i128,
                })
            }
        }
    }
}

/// Encodes `body` as the primary object of a message into `buf`.
///
/// Handles are moved out of `body` into the handle table of `buf`. If encoding
/// fails the byte buffer is left empty and the handles that were moved out of
/// `body` are left in the handle table for the caller to dispose of.
///
/// The handle table of `buf` must not own any handle on entry; otherwise this
/// fails with `UnreleasedHandle` and neither `buf` nor `body` is modified.
pub fn encode_message<T: WireType>(
    buf: &mut MessageBuf,
    header: &TransactionHeader,
    body: &mut T,
) -> Result<()> {
    encode_message_with_context(&Context::default(), buf, header, body)
}

/// Encodes a message using the specified context.
pub fn encode_message_with_context<T: WireType>(
    context: &Context,
    buf: &mut MessageBuf,
    header: &TransactionHeader,
    body: &mut T,
) -> Result<()> {
    let (bytes, handles) = buf.split_mut();
    check_handles_released(handles)?;
    let mut value = body.take_value();
    Encoder::encode_with_context(context, bytes, handles, header, &T::shape(), &mut value)
}

/// Decodes a message whose primary object is a `T` from `buf`.
///
/// On success the handles of the message are taken out of `buf`. On failure
/// `buf` is left untouched.
pub fn decode_message<T: WireType>(buf: &mut MessageBuf) -> Result<(TransactionHeader, T)> {
    decode_message_with_context(&Context::default(), buf)
}

/// Decodes a message using the specified context.
pub fn decode_message_with_context<T: WireType>(
    context: &Context,
    buf: &mut MessageBuf,
) -> Result<(TransactionHeader, T)> {
    let (bytes, handles) = buf.split_mut();
    decode_and_convert(context, &bytes[..], &mut handles[..], &T::shape(), T::from_value)
}
