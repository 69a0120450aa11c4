// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A portable representation of handle-like objects for fidl.
//!
//! The codec only sequences handles: it moves them between values and the
//! out-of-band handle table in discovery order. Duplicating, transferring and
//! closing the underlying kernel objects belongs to the platform, so `Handle`
//! never closes anything when it is dropped.

use std::mem;

/// The raw value of a handle, as it appears in a channel's handle table.
pub type RawHandle = u32;

/// The raw value of the invalid handle.
pub const INVALID_RAW_HANDLE: RawHandle = 0;

/// Representation of a handle-like object
#[derive(PartialEq, Eq, Debug, Hash)]
pub struct Handle(RawHandle);

impl Handle {
    /// Return an invalid handle
    pub fn invalid() -> Handle {
        Handle(INVALID_RAW_HANDLE)
    }

    /// Wraps a raw handle value. The caller gives up ownership of `raw`.
    pub fn from_raw(raw: RawHandle) -> Handle {
        Handle(raw)
    }

    /// Return true if this handle is invalid
    pub fn is_invalid(&self) -> bool {
        self.0 == INVALID_RAW_HANDLE
    }

    /// The raw value of the handle.
    pub fn raw_handle(&self) -> RawHandle {
        self.0
    }

    /// Gives up ownership of the handle, returning its raw value.
    pub fn into_raw(self) -> RawHandle {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Handle::invalid()
    }
}

/// Moves the handle out of `handle`, leaving the invalid handle in its place.
pub fn take_handle(handle: &mut Handle) -> Handle {
    mem::replace(handle, Handle::invalid())
}

/// An encoded message: a byte buffer and its handle table.
///
/// A `MessageBuf` is essentially a byte buffer and a vector of
/// handles, but move semantics for "taking" handles requires special handling.
#[derive(Debug, Default)]
pub struct MessageBuf {
    bytes: Vec<u8>,
    handles: Vec<Handle>,
}

impl MessageBuf {
    /// Create a new, empty, message buffer.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a new non-empty message buffer.
    pub fn new_with(v: Vec<u8>, h: Vec<Handle>) -> Self {
        Self { bytes: v, handles: h }
    }

    /// Splits apart the message buf into a vector of bytes and a vector of handles.
    pub fn split_mut(&mut self) -> (&mut Vec<u8>, &mut Vec<Handle>) {
        (&mut self.bytes, &mut self.handles)
    }

    /// Splits apart the message buf into a vector of bytes and a vector of handles.
    pub fn split(self) -> (Vec<u8>, Vec<Handle>) {
        (self.bytes, self.handles)
    }

    /// Get a reference to the bytes of the message buffer, as a `&[u8]` slice.
    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// The number of handles in the message buffer. Note this counts the number
    /// available when the message was received; `take_handle` does not affect
    /// the count.
    pub fn n_handles(&self) -> usize {
        self.handles.len()
    }

    /// Take the handle at the specified index from the message buffer. If the
    /// method is called again with the same index, it will return `None`, as
    /// will happen if the index exceeds the number of handles available.
    pub fn take_handle(&mut self, index: usize) -> Option<Handle> {
        self.handles
            .get_mut(index)
            .and_then(|handle| if handle.is_invalid() { None } else { Some(take_handle(handle)) })
    }

    /// Clear the bytes and handles contained in the buf.
    ///
    /// Handles are forgotten, not closed; the caller must have disposed of them.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.handles.clear();
    }
}
