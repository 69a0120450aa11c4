// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Encoding contains the encoder and decoder for FIDL messages.
//!
//! A message is a 16-byte transaction header followed by the primary object, a
//! struct. Both are allocated as objects whose size is rounded up to 8 bytes.
//! Within an object, every primitive is aligned to its own width and every
//! struct to its declared inline alignment. Padding is always zero.

use {
    crate::{
        handle::{take_handle, Handle},
        layout::{align, checked_align, PrimitiveKind, RecordType, Shape, MAX_ALIGNMENT},
        value::Value,
        Error, Result,
    },
    byteorder::{ByteOrder, LittleEndian},
    log::{debug, trace},
    static_assertions::assert_impl_all,
};

/// The maximum recursion depth of encoding and decoding.
/// Each nested aggregate type (structs and arrays) counts as one step in the
/// recursion depth.
pub const MAX_RECURSION: usize = 32;

/// Indicates that an optional value is present.
pub const ALLOC_PRESENT_U32: u32 = u32::MAX;
/// Indicates that an optional value is absent.
pub const ALLOC_ABSENT_U32: u32 = 0;

/// Size of the transaction header at the start of every message.
pub const HEADER_SIZE: usize = 16;

/// Context for encoding and decoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Context {
    /// Maximum nesting of structs and arrays.
    pub max_depth: usize,
    /// Reject trailing bytes after the primary object and non-zero padding when decoding.
    pub strict: bool,
}

impl Default for Context {
    fn default() -> Self {
        Context { max_depth: MAX_RECURSION, strict: true }
    }
}

assert_impl_all!(Context: Send, Sync);
assert_impl_all!(Shape: Send, Sync);
assert_impl_all!(Value: Send, Sync);

/// Header for transactional FIDL messages
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TransactionHeader {
    /// Transaction ID which identifies a request-response pair
    pub tx_id: u32,
    /// Reserved, zero when produced by this encoder
    pub reserved: u32,
    /// Flags
    pub flags: u32,
    /// Ordinal which identifies the FIDL method
    pub ordinal: u32,
}

impl TransactionHeader {
    /// Creates a header with zero `reserved` and `flags` words.
    pub fn new(tx_id: u32, ordinal: u32) -> Self {
        TransactionHeader { tx_id, reserved: 0, flags: 0, ordinal }
    }

    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.write_uint(self.tx_id.into(), 4)?;
        encoder.write_uint(self.reserved.into(), 4)?;
        encoder.write_uint(self.flags.into(), 4)?;
        encoder.write_uint(self.ordinal.into(), 4)
    }

    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        Ok(TransactionHeader {
            tx_id: decoder.read_uint(4)? as u32,
            reserved: decoder.read_uint(4)? as u32,
            flags: decoder.read_uint(4)? as u32,
            ordinal: decoder.read_uint(4)? as u32,
        })
    }
}

/// Decode the transaction header from a message.
/// Returns the header and a reference to the tail of the message.
pub fn decode_transaction_header(bytes: &[u8]) -> Result<(TransactionHeader, &[u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::TruncatedHeader { len: bytes.len() });
    }
    let (header_bytes, body_bytes) = bytes.split_at(HEADER_SIZE);
    let mut decoder = Decoder {
        head: 0,
        remaining_depth: 0,
        strict: false,
        buf: header_bytes,
        handles: &[],
        next_handle: 0,
    };
    let header = TransactionHeader::decode(&mut decoder)?;
    Ok((header, body_bytes))
}

/// Returns the primary object's struct type and inline size, checking that the
/// whole shape is well formed and nests at most `max_depth` levels.
fn primary_record(shape: &Shape, max_depth: usize) -> Result<(&RecordType, usize)> {
    let record = shape
        .as_record()
        .ok_or_else(|| Error::PrimaryObjectNotRecord { type_name: shape.to_string() })?;
    let size = shape.inline_size_with_depth(max_depth)?;
    Ok((record, size))
}

/// Checks that the handle table handed to the encoder owns no handles.
///
/// Invalid entries, such as those left behind by a successful decode, are
/// fine to discard.
pub(crate) fn check_handles_released(handles: &[Handle]) -> Result<()> {
    match handles.iter().position(|handle| !handle.is_invalid()) {
        Some(index) => Err(Error::UnreleasedHandle { index }),
        None => Ok(()),
    }
}

/// Masks `value` down to its low `width` bytes.
fn truncate(value: u64, width: usize) -> u64 {
    if width >= 8 {
        value
    } else {
        value & ((1u64 << (width * 8)) - 1)
    }
}

/// Encoding state
#[derive(Debug)]
pub struct Encoder<'a> {
    /// Offset at which the next field is written.
    head: usize,

    /// The maximum remaining number of recursive steps.
    remaining_depth: usize,

    /// Buffer to write output data into.
    ///
    /// New objects are appended to the end of the `Vec`, zero-filled, before
    /// their fields are written.
    buf: &'a mut Vec<u8>,

    /// Buffer to write output handles into, in discovery order.
    handles: &'a mut Vec<Handle>,
}

impl<'a> Encoder<'a> {
    /// Encodes a message made of `header` and the primary object `value` of type `shape`
    /// into the provided data and handle buffers.
    pub fn encode(
        buf: &'a mut Vec<u8>,
        handles: &'a mut Vec<Handle>,
        header: &TransactionHeader,
        shape: &Shape,
        value: &mut Value,
    ) -> Result<()> {
        Self::encode_with_context(&Context::default(), buf, handles, header, shape, value)
    }

    /// Encodes a message using the specified context.
    ///
    /// Handles are moved out of `value` into `handles`. On failure `buf` is left
    /// empty, and every handle that was held by `value` is left in `handles` for
    /// the caller to dispose of.
    ///
    /// `handles` must not own any handle on entry: a valid handle in it fails
    /// with `UnreleasedHandle` before either buffer or `value` is touched.
    pub fn encode_with_context(
        context: &Context,
        buf: &'a mut Vec<u8>,
        handles: &'a mut Vec<Handle>,
        header: &TransactionHeader,
        shape: &Shape,
        value: &mut Value,
    ) -> Result<()> {
        if let Err(err) = check_handles_released(handles) {
            debug!("refusing to encode {} (ordinal {:#x}): {}", shape, header.ordinal, err);
            return Err(err);
        }
        buf.clear();
        handles.clear();

        let mut encoder =
            Encoder { head: 0, remaining_depth: context.max_depth, buf, handles };
        let result = encoder.encode_message(header, shape, value);
        if let Err(err) = &result {
            debug!("failed to encode {} (ordinal {:#x}): {}", shape, header.ordinal, err);
            encoder.buf.clear();
            value.take_handles(encoder.handles);
        }
        result
    }

    fn encode_message(
        &mut self,
        header: &TransactionHeader,
        shape: &Shape,
        value: &mut Value,
    ) -> Result<()> {
        let (record, size) = primary_record(shape, self.remaining_depth)?;

        self.head = self.new_object(HEADER_SIZE)?;
        header.encode(self)?;

        trace!(
            "encoding struct {} ({} inline bytes), tx_id {} ordinal {:#x}",
            record.name(),
            size,
            header.tx_id,
            header.ordinal
        );
        self.head = self.new_object(size)?;
        self.marshal(shape, value)
    }

    /// Appends a zero-filled object of `size` bytes, rounded up to 8, and returns its offset.
    pub fn new_object(&mut self, size: usize) -> Result<usize> {
        let start = self.buf.len();
        let end = checked_align(size, MAX_ALIGNMENT)
            .and_then(|size| start.checked_add(size))
            .ok_or(Error::OutOfRange)?;
        self.buf.resize(end, 0);
        Ok(start)
    }

    /// Writes the low `width` bytes of `value` little-endian, after aligning the
    /// cursor to `width`.
    ///
    /// `width` must be 1, 2, 4, or 8.
    pub fn write_uint(&mut self, value: u64, width: usize) -> Result<()> {
        let slot = self.next_slot(width)?;
        LittleEndian::write_uint(slot, truncate(value, width), width);
        Ok(())
    }

    /// Writes the low `width` bytes of the two's complement `value`, after
    /// aligning the cursor to `width`.
    ///
    /// `width` must be 1, 2, 4, or 8.
    pub fn write_int(&mut self, value: i64, width: usize) -> Result<()> {
        self.write_uint(value as u64, width)
    }

    fn next_slot(&mut self, width: usize) -> Result<&mut [u8]> {
        let start = align(self.head, width);
        let slot = self.buf.get_mut(start..start + width).ok_or(Error::OutOfRange)?;
        self.head = start + width;
        Ok(slot)
    }

    /// Runs the provided closure at the next recursion depth level,
    /// erroring if the maximum recursion limit has been reached.
    fn recurse<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        if self.remaining_depth == 0 {
            return Err(Error::MaxRecursionDepth);
        }
        self.remaining_depth -= 1;
        let res = f(self);
        self.remaining_depth += 1;
        res
    }

    /// Encodes `value` as a `shape` at the cursor.
    ///
    /// Any handles stored in the value are swapped for the invalid handle and
    /// appended to the handle table.
    pub fn marshal(&mut self, shape: &Shape, value: &mut Value) -> Result<()> {
        match (shape, value) {
            (Shape::Primitive(kind), value) => self.write_primitive(*kind, value),
            (Shape::Array { element, count }, Value::Array(items)) => {
                if items.len() != *count {
                    return Err(Error::ArrayLengthMismatch {
                        expected: *count,
                        actual: items.len(),
                    });
                }
                self.recurse(|encoder| {
                    items.iter_mut().try_for_each(|item| encoder.marshal(element, item))
                })
            }
            (Shape::Record(record), Value::Record(fields)) => {
                record.check_alignment()?;
                if fields.len() != record.fields().len() {
                    return Err(Error::FieldCountMismatch {
                        record: record.name().to_string(),
                        expected: record.fields().len(),
                        actual: fields.len(),
                    });
                }
                self.recurse(|encoder| {
                    encoder.head = align(encoder.head, record.alignment());
                    if fields.is_empty() {
                        return encoder.write_uint(0, 1);
                    }
                    record
                        .fields()
                        .iter()
                        .zip(fields.iter_mut())
                        .try_for_each(|(field, value)| encoder.marshal(&field.shape, value))
                })
            }
            (Shape::Handle { nullable }, Value::Handle(handle)) => {
                if handle.is_invalid() {
                    if !*nullable {
                        return Err(Error::NotNullable);
                    }
                    return self.write_uint(ALLOC_ABSENT_U32.into(), 4);
                }
                self.write_uint(ALLOC_PRESENT_U32.into(), 4)?;
                self.handles.push(take_handle(handle));
                Ok(())
            }
            (Shape::String { .. }, _) | (Shape::Vector { .. }, _) => {
                Err(Error::UnsupportedType { type_name: shape.to_string() })
            }
            (shape, value) => {
                Err(Error::TypeMismatch { expected: shape.to_string(), found: value.kind_name() })
            }
        }
    }

    fn write_primitive(&mut self, kind: PrimitiveKind, value: &Value) -> Result<()> {
        let width = kind.width();
        match (kind, value) {
            (PrimitiveKind::Bool, Value::Bool(b)) => self.write_uint(if *b { 1 } else { 0 }, width),
            (PrimitiveKind::Int8, Value::Int8(n)) => self.write_int((*n).into(), width),
            (PrimitiveKind::Int16, Value::Int16(n)) => self.write_int((*n).into(), width),
            (PrimitiveKind::Int32, Value::Int32(n)) => self.write_int((*n).into(), width),
            (PrimitiveKind::Int64, Value::Int64(n)) => self.write_int(*n, width),
            (PrimitiveKind::Uint8, Value::Uint8(n)) => self.write_uint((*n).into(), width),
            (PrimitiveKind::Uint16, Value::Uint16(n)) => self.write_uint((*n).into(), width),
            (PrimitiveKind::Uint32, Value::Uint32(n)) => self.write_uint((*n).into(), width),
            (PrimitiveKind::Uint64, Value::Uint64(n)) => self.write_uint(*n, width),
            (PrimitiveKind::Float32, Value::Float32(f)) => {
                self.write_uint(f.to_bits().into(), width)
            }
            (PrimitiveKind::Float64, Value::Float64(f)) => self.write_uint(f.to_bits(), width),
            (kind, value) => Err(Error::TypeMismatch {
                expected: kind.name().to_string(),
                found: value.kind_name(),
            }),
        }
    }
}

/// Decoding state
#[derive(Debug)]
pub struct Decoder<'a> {
    /// Offset of the next byte to read.
    head: usize,

    /// The maximum remaining number of recursive steps.
    remaining_depth: usize,

    /// Whether padding bytes must be zero.
    strict: bool,

    /// Buffer from which to read data: the header and the primary object, with
    /// any trailing bytes already cut off.
    buf: &'a [u8],

    /// Buffer from which to read handles.
    ///
    /// Entries are only copied out while decoding; the caller's table is
    /// updated once the whole message has decoded successfully.
    handles: &'a [Handle],

    /// Index of the next handle to read.
    next_handle: usize,
}

impl<'a> Decoder<'a> {
    /// Decodes a message whose primary object has type `shape` from the provided
    /// data and handle buffers.
    pub fn decode(
        bytes: &'a [u8],
        handles: &'a mut [Handle],
        shape: &Shape,
    ) -> Result<(TransactionHeader, Value)> {
        Self::decode_with_context(&Context::default(), bytes, handles, shape)
    }

    /// Decodes a message using the specified context.
    ///
    /// Decoding is all-or-nothing. On success, the handles the message refers to
    /// are moved out of `handles` into the returned value. On failure, `handles`
    /// is left untouched and the caller remains responsible for closing them.
    pub fn decode_with_context(
        context: &Context,
        bytes: &'a [u8],
        handles: &'a mut [Handle],
        shape: &Shape,
    ) -> Result<(TransactionHeader, Value)> {
        decode_and_convert(context, bytes, handles, shape, Ok)
    }

    /// Reads `width` bytes little-endian, after aligning the cursor to `width`.
    ///
    /// `width` must be 1, 2, 4, or 8.
    pub fn read_uint(&mut self, width: usize) -> Result<u64> {
        let slot = self.next_slot(width)?;
        Ok(LittleEndian::read_uint(slot, width))
    }

    /// Reads a sign-extended two's complement integer of `width` bytes, after
    /// aligning the cursor to `width`.
    ///
    /// `width` must be 1, 2, 4, or 8.
    pub fn read_int(&mut self, width: usize) -> Result<i64> {
        let slot = self.next_slot(width)?;
        Ok(LittleEndian::read_int(slot, width))
    }

    fn next_slot(&mut self, width: usize) -> Result<&'a [u8]> {
        self.skip_to(align(self.head, width))?;
        let buf: &'a [u8] = self.buf;
        let slot = buf.get(self.head..self.head + width).ok_or(Error::OutOfRange)?;
        self.head += width;
        Ok(slot)
    }

    /// Advances the cursor to `offset`, checking that the skipped bytes are zero.
    fn skip_to(&mut self, offset: usize) -> Result<()> {
        self.check_padding(self.head, offset)?;
        self.head = offset;
        Ok(())
    }

    /// Checks that the bytes in `start..end` are zero. Always succeeds in lenient mode.
    fn check_padding(&self, start: usize, end: usize) -> Result<()> {
        if !self.strict || start >= end {
            return Ok(());
        }
        let padding = self.buf.get(start..end).ok_or(Error::OutOfRange)?;
        match padding.iter().position(|b| *b != 0) {
            Some(i) => Err(Error::NonZeroPadding { padding_start: start, non_zero_pos: start + i }),
            None => Ok(()),
        }
    }

    /// Take the next handle from the `handles` list.
    pub fn take_next_handle(&mut self) -> Result<Handle> {
        let index = self.next_handle;
        let handle = self.handles.get(index).ok_or(Error::HandleCountMismatch {
            expected: index + 1,
            actual: self.handles.len(),
        })?;
        if handle.is_invalid() {
            return Err(Error::InvalidHandle { index });
        }
        self.next_handle += 1;
        Ok(Handle::from_raw(handle.raw_handle()))
    }

    /// Runs the provided closure at the next recursion depth level,
    /// erroring if the maximum recursion limit has been reached.
    fn recurse<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        if self.remaining_depth == 0 {
            return Err(Error::MaxRecursionDepth);
        }
        self.remaining_depth -= 1;
        let res = f(self);
        self.remaining_depth += 1;
        res
    }

    /// Decodes a value of type `shape` at the cursor.
    pub fn unmarshal(&mut self, shape: &Shape) -> Result<Value> {
        match shape {
            Shape::Primitive(kind) => self.read_primitive(*kind),
            Shape::Array { element, count } => self.recurse(|decoder| {
                (0..*count)
                    .map(|_| decoder.unmarshal(element))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }),
            Shape::Record(record) => {
                record.check_alignment()?;
                self.recurse(|decoder| {
                    decoder.skip_to(align(decoder.head, record.alignment()))?;
                    if record.fields().is_empty() {
                        let start = decoder.head;
                        if decoder.read_uint(1)? != 0 && decoder.strict {
                            return Err(Error::NonZeroPadding {
                                padding_start: start,
                                non_zero_pos: start,
                            });
                        }
                        return Ok(Value::Record(vec![]));
                    }
                    record
                        .fields()
                        .iter()
                        .map(|field| decoder.unmarshal(&field.shape))
                        .collect::<Result<Vec<_>>>()
                        .map(Value::Record)
                })
            }
            Shape::Handle { nullable } => self.read_handle(*nullable),
            Shape::String { .. } | Shape::Vector { .. } => {
                Err(Error::UnsupportedType { type_name: shape.to_string() })
            }
        }
    }

    fn read_primitive(&mut self, kind: PrimitiveKind) -> Result<Value> {
        let width = kind.width();
        Ok(match kind {
            PrimitiveKind::Bool => {
                let offset = self.head;
                match self.read_uint(width)? {
                    0 => Value::Bool(false),
                    1 => Value::Bool(true),
                    value => {
                        return Err(Error::InvalidBooleanValue { value: value as u8, offset })
                    }
                }
            }
            PrimitiveKind::Int8 => Value::Int8(self.read_int(width)? as i8),
            PrimitiveKind::Int16 => Value::Int16(self.read_int(width)? as i16),
            PrimitiveKind::Int32 => Value::Int32(self.read_int(width)? as i32),
            PrimitiveKind::Int64 => Value::Int64(self.read_int(width)?),
            PrimitiveKind::Uint8 => Value::Uint8(self.read_uint(width)? as u8),
            PrimitiveKind::Uint16 => Value::Uint16(self.read_uint(width)? as u16),
            PrimitiveKind::Uint32 => Value::Uint32(self.read_uint(width)? as u32),
            PrimitiveKind::Uint64 => Value::Uint64(self.read_uint(width)?),
            PrimitiveKind::Float32 => Value::Float32(f32::from_bits(self.read_uint(width)? as u32)),
            PrimitiveKind::Float64 => Value::Float64(f64::from_bits(self.read_uint(width)?)),
        })
    }

    fn read_handle(&mut self, nullable: bool) -> Result<Value> {
        match self.read_uint(4)? as u32 {
            ALLOC_ABSENT_U32 if nullable => Ok(Value::Handle(Handle::invalid())),
            ALLOC_ABSENT_U32 => Err(Error::NotNullable),
            ALLOC_PRESENT_U32 => self.take_next_handle().map(Value::Handle),
            value => Err(Error::InvalidPresenceIndicator { value: value.into() }),
        }
    }
}

/// Decodes a message and converts its primary object with `convert`.
///
/// The handles consumed by the message are only moved out of `handles` once
/// `convert` has succeeded too, so a failed conversion leaves the caller's
/// handle table untouched.
pub(crate) fn decode_and_convert<R, F>(
    context: &Context,
    bytes: &[u8],
    handles: &mut [Handle],
    shape: &Shape,
    convert: F,
) -> Result<(TransactionHeader, R)>
where
    F: FnOnce(Value) -> Result<R>,
{
    let result = decode_message(context, bytes, handles, shape)
        .and_then(|(header, value, consumed)| Ok((header, convert(value)?, consumed)));
    match result {
        Ok((header, converted, consumed)) => {
            handles[..consumed].iter_mut().for_each(|handle| {
                take_handle(handle);
            });
            Ok((header, converted))
        }
        Err(err) => {
            debug!("failed to decode {}: {}", shape, err);
            Err(err)
        }
    }
}

/// Decodes the header and primary object, returning the number of handles consumed.
fn decode_message(
    context: &Context,
    bytes: &[u8],
    handles: &[Handle],
    shape: &Shape,
) -> Result<(TransactionHeader, Value, usize)> {
    let (header, body) = decode_transaction_header(bytes)?;
    let (record, size) = primary_record(shape, context.max_depth)?;

    let object_size = checked_align(size, MAX_ALIGNMENT).ok_or(Error::OutOfRange)?;
    if body.len() < object_size {
        return Err(Error::TruncatedPayload { expected: object_size, actual: body.len() });
    }
    if body.len() > object_size && context.strict {
        return Err(Error::TrailingBytes { expected: object_size, actual: body.len() });
    }
    trace!(
        "decoding struct {} ({} inline bytes), tx_id {} ordinal {:#x}, {} handles",
        record.name(),
        size,
        header.tx_id,
        header.ordinal,
        handles.len()
    );

    let mut decoder = Decoder {
        head: HEADER_SIZE,
        remaining_depth: context.max_depth,
        strict: context.strict,
        buf: &bytes[..HEADER_SIZE + object_size],
        handles,
        next_handle: 0,
    };
    let value = decoder.unmarshal(shape)?;
    // Padding between the last field and the end of the object.
    decoder.check_padding(decoder.head, decoder.buf.len())?;
    if decoder.next_handle != handles.len() {
        return Err(Error::HandleCountMismatch {
            expected: decoder.next_handle,
            actual: handles.len(),
        });
    }
    Ok((header, value, decoder.next_handle))
}
