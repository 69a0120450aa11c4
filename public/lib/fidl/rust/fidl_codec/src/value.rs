// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Dynamic in-memory values walked by the encoder and produced by the decoder.

use crate::handle::{take_handle, Handle};

/// A value of some FIDL type. Which type is decided by the [`Shape`](crate::layout::Shape)
/// it is encoded or decoded with.
#[derive(Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    /// Elements of a fixed-size array, in index order.
    Array(Vec<Value>),
    /// Fields of a struct, in declaration order.
    Record(Vec<Value>),
    /// A handle. The invalid handle stands for an absent nullable handle.
    Handle(Handle),
}

impl Value {
    /// A short name for the kind of value, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Uint8(_) => "uint8",
            Value::Uint16(_) => "uint16",
            Value::Uint32(_) => "uint32",
            Value::Uint64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Array(_) => "array",
            Value::Record(_) => "struct",
            Value::Handle(_) => "handle",
        }
    }

    /// Moves every valid handle still held by this value into `out`, in traversal order.
    pub fn take_handles(&mut self, out: &mut Vec<Handle>) {
        match self {
            Value::Array(items) | Value::Record(items) => {
                items.iter_mut().for_each(|item| item.take_handles(out))
            }
            Value::Handle(handle) if !handle.is_invalid() => out.push(take_handle(handle)),
            _ => {}
        }
    }
}
