// Copyright 2016 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Error (common to all fidl codec operations)

use {std::result, thiserror::Error};

/// A specialized `Result` type for FIDL codec operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type used by FIDL codec operations.
///
/// Every error aborts the whole encode or decode call. Callers must treat any
/// error as "no valid output was produced".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The traversal met a shape it cannot encode or decode.
    #[error("unsupported type {type_name}")]
    UnsupportedType {
        /// Description of the offending type.
        type_name: String,
    },

    /// A boolean was encoded as a byte other than 0 or 1.
    #[error("{value} is not a valid bool value (at byte offset {offset})")]
    InvalidBooleanValue {
        /// The byte found on the wire.
        value: u8,
        /// Offset of that byte within the message.
        offset: usize,
    },

    /// The message is too short to contain a transaction header.
    #[error("message of {len} bytes is too short to contain a transaction header")]
    TruncatedHeader {
        /// Number of bytes available.
        len: usize,
    },

    /// The message is too short to contain the primary object.
    #[error("primary object needs {expected} bytes but only {actual} are available")]
    TruncatedPayload {
        /// Number of bytes the primary object occupies.
        expected: usize,
        /// Number of bytes available after the header.
        actual: usize,
    },

    /// The message contains bytes beyond the end of the primary object.
    #[error("primary object occupies {expected} bytes but {actual} were provided")]
    TrailingBytes {
        /// Number of bytes the primary object occupies.
        expected: usize,
        /// Number of bytes available after the header.
        actual: usize,
    },

    /// The number of handles in the handle table does not match the number of
    /// handles referenced by the encoded data.
    ///
    /// When the handle table runs out mid-traversal, `expected` is a lower bound.
    #[error("message references {expected} handles but {actual} were provided")]
    HandleCountMismatch {
        /// Number of handles referenced by the data.
        expected: usize,
        /// Number of handles in the table.
        actual: usize,
    },

    /// A padding byte was not zero.
    #[error("non-zero padding byte at offset {non_zero_pos} (padding starts at {padding_start})")]
    NonZeroPadding {
        /// Offset of the first padding byte of the run.
        padding_start: usize,
        /// Offset of the offending byte.
        non_zero_pos: usize,
    },

    /// The primary object of a message must be a record.
    #[error("primary object must be a struct, found {type_name}")]
    PrimaryObjectNotRecord {
        /// Description of the offending type.
        type_name: String,
    },

    /// A value did not have the shape of the type it was encoded or converted as.
    #[error("expected a value of type {expected}, found {found}")]
    TypeMismatch {
        /// Description of the expected type.
        expected: String,
        /// Kind of the value that was found.
        found: &'static str,
    },

    /// An array value did not have the number of elements its type declares.
    #[error("expected an array of {expected} elements, found {actual}")]
    ArrayLengthMismatch {
        /// Declared element count.
        expected: usize,
        /// Actual element count.
        actual: usize,
    },

    /// A record value did not have the number of fields its type declares.
    #[error("struct {record} has {expected} fields, found {actual}")]
    FieldCountMismatch {
        /// Name of the record type.
        record: String,
        /// Declared field count.
        expected: usize,
        /// Actual field count.
        actual: usize,
    },

    /// A record declared an inline alignment that is not a power of two no larger than 8.
    #[error("struct {record} declares invalid alignment {alignment}")]
    InvalidAlignment {
        /// Name of the record type.
        record: String,
        /// The declared alignment.
        alignment: usize,
    },

    /// Nesting of arrays and records exceeded the configured limit.
    #[error("exceeded maximum recursion depth")]
    MaxRecursionDepth,

    /// There was an attempt to read or write an absent value as a non-nullable type.
    #[error("absent value for a non-nullable type")]
    NotNullable,

    /// A presence marker was neither the present nor the absent marker.
    #[error("invalid presence indicator {value:#x}")]
    InvalidPresenceIndicator {
        /// The marker found on the wire.
        value: u64,
    },

    /// The handle table held an invalid handle where a present handle was encoded.
    #[error("handle at index {index} is invalid")]
    InvalidHandle {
        /// Index into the handle table.
        index: usize,
    },

    /// The handle table passed to the encoder still owned a handle. The codec
    /// never closes handles, so it refuses to overwrite the table.
    #[error("handle table still holds a valid handle at index {index}")]
    UnreleasedHandle {
        /// Index of the first valid handle in the table.
        index: usize,
    },

    /// A decoded enum value does not name a declared member.
    #[error("{value} is not a member of enum {type_name}")]
    UnknownEnumMember {
        /// Name of the enum type.
        type_name: &'static str,
        /// The decoded primitive value.
        value: i128,
    },

    /// The cursor left the allocated object.
    #[error("the FIDL object could not fit within the provided buffer range")]
    OutOfRange,
}
