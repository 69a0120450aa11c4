// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! An encoder and decoder for the inline portion of the [FIDL wire format].
//!
//! Messages are a 16-byte transaction header followed by a struct, the primary
//! object. Types are described by a [`Shape`] and values by a [`Value`], or, for
//! Rust types implementing [`WireType`], converted to and from them at the edges.
//! Handles travel out-of-band in a handle table, in the order they are met.
//!
//! Out-of-line types (strings and vectors) are described but rejected by the
//! codec with [`Error::UnsupportedType`].
//!
//! [FIDL wire format]: https://fuchsia.dev/fuchsia-src/reference/fidl/language/wire-format

pub mod encoding;
pub mod error;
pub mod handle;
pub mod layout;
pub mod value;
#[macro_use]
pub mod wire_type;

pub use self::encoding::{
    decode_transaction_header, Context, Decoder, Encoder, TransactionHeader, HEADER_SIZE,
};
pub use self::error::{Error, Result};
pub use self::handle::{Handle, MessageBuf};
pub use self::layout::{align, checked_align, FieldType, PrimitiveKind, RecordType, Shape};
pub use self::value::Value;
pub use self::wire_type::{
    decode_message, decode_message_with_context, encode_message, encode_message_with_context,
    WireType,
};
