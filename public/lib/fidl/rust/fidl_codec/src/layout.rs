// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Type descriptions which drive encoding and decoding.
//!
//! A [`Shape`] describes how a type is laid out inline: which primitive it is,
//! how many elements an array holds, or which fields a struct declares. The
//! descriptions are plain data, so they may come from generated code, from the
//! [`fidl_struct!`](crate::fidl_struct) macro, or be assembled at runtime.

use {
    crate::{encoding::MAX_RECURSION, Error, Result},
    std::{borrow::Cow, fmt},
};

/// Largest inline alignment of any object; also the granularity at which
/// objects are allocated in a message.
pub const MAX_ALIGNMENT: usize = 8;

/// Rounds `size` up if necessary so that it is a multiple of `boundary`.
///
/// Requires `boundary` to be a (nonzero) power of two, and `size` to be small
/// enough that the result fits in a `usize`. Use [`checked_align`] for sizes
/// that are not bounded by a buffer length.
#[inline(always)]
pub fn align(size: usize, boundary: usize) -> usize {
    debug_assert_ne!(boundary, 0);
    debug_assert_eq!(boundary & (boundary - 1), 0);
    (size + boundary - 1) & !(boundary - 1)
}

/// Like [`align`], but returns `None` instead of overflowing.
#[inline(always)]
pub fn checked_align(size: usize, boundary: usize) -> Option<usize> {
    debug_assert_ne!(boundary, 0);
    debug_assert_eq!(boundary & (boundary - 1), 0);
    size.checked_add(boundary - 1).map(|end| end & !(boundary - 1))
}

/// Aligns `offset` to `alignment`, then advances it by `size`.
fn place(offset: usize, alignment: usize, size: usize) -> Result<usize> {
    checked_align(offset, alignment)
        .and_then(|start| start.checked_add(size))
        .ok_or(Error::OutOfRange)
}

/// The primitive kinds of the wire format.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl PrimitiveKind {
    /// Width in bytes of the encoded primitive. Primitives are aligned to their width.
    pub fn width(self) -> usize {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::Int8 | PrimitiveKind::Uint8 => 1,
            PrimitiveKind::Int16 | PrimitiveKind::Uint16 => 2,
            PrimitiveKind::Int32 | PrimitiveKind::Uint32 | PrimitiveKind::Float32 => 4,
            PrimitiveKind::Int64 | PrimitiveKind::Uint64 | PrimitiveKind::Float64 => 8,
        }
    }

    /// The FIDL name of the primitive.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Int8 => "int8",
            PrimitiveKind::Int16 => "int16",
            PrimitiveKind::Int32 => "int32",
            PrimitiveKind::Int64 => "int64",
            PrimitiveKind::Uint8 => "uint8",
            PrimitiveKind::Uint16 => "uint16",
            PrimitiveKind::Uint32 => "uint32",
            PrimitiveKind::Uint64 => "uint64",
            PrimitiveKind::Float32 => "float32",
            PrimitiveKind::Float64 => "float64",
        }
    }
}

/// The structural classification of a type.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// A fixed-width primitive.
    Primitive(PrimitiveKind),
    /// `count` contiguous elements of `element`.
    Array {
        /// Shape of every element.
        element: Box<Shape>,
        /// Number of elements.
        count: usize,
    },
    /// A struct.
    Record(RecordType),
    /// A kernel object handle, transferred out-of-band in the handle table.
    Handle {
        /// Whether the handle may be absent.
        nullable: bool,
    },
    /// A UTF-8 string. Strings are stored out-of-line, which this codec does not support.
    String {
        /// Whether the string may be absent.
        nullable: bool,
    },
    /// A variable-length vector. Vectors are stored out-of-line, which this codec does not
    /// support.
    Vector {
        /// Shape of every element.
        element: Box<Shape>,
        /// Whether the vector may be absent.
        nullable: bool,
    },
}

impl Shape {
    /// Returns the alignment of the inline portion of the type.
    pub fn inline_alignment(&self) -> usize {
        let mut shape = self;
        loop {
            match shape {
                Shape::Primitive(kind) => return kind.width(),
                Shape::Array { element, .. } => shape = &**element,
                Shape::Record(record) => return record.alignment(),
                Shape::Handle { .. } => return 4,
                Shape::String { .. } | Shape::Vector { .. } => return 8,
            }
        }
    }

    /// Returns the number of bytes the inline portion of the type spans when laid
    /// out starting at an offset aligned to `MAX_ALIGNMENT`.
    ///
    /// Fails if a record declares an invalid alignment, if arrays and records nest
    /// deeper than `MAX_RECURSION` levels, or if the size does not fit in a `usize`.
    pub fn inline_size(&self) -> Result<usize> {
        self.inline_size_with_depth(MAX_RECURSION)
    }

    /// Like [`Shape::inline_size`], allowing `max_depth` levels of nested arrays and records.
    pub fn inline_size_with_depth(&self, max_depth: usize) -> Result<usize> {
        self.layout_end(0, max_depth)
    }

    /// Checks that the shape can be laid out: every record declares a usable
    /// alignment, nesting stays within `MAX_RECURSION`, and the size fits in a `usize`.
    pub fn validate(&self) -> Result<()> {
        self.inline_size().map(|_| ())
    }

    /// Returns the cursor position after laying out this type with the cursor at `offset`.
    ///
    /// This mirrors the encoder's walk exactly: every primitive is aligned to its own
    /// width, and a record is aligned to its declared alignment before its fields.
    /// Arrays and records use up one level of `depth` each.
    fn layout_end(&self, offset: usize, depth: usize) -> Result<usize> {
        match self {
            Shape::Primitive(kind) => place(offset, kind.width(), kind.width()),
            Shape::Array { element, count } => {
                let depth = depth.checked_sub(1).ok_or(Error::MaxRecursionDepth)?;
                array_end(element, *count, offset, depth)
            }
            Shape::Record(record) => record.layout_end(offset, depth),
            Shape::Handle { .. } => place(offset, 4, 4),
            Shape::String { .. } | Shape::Vector { .. } => place(offset, 8, 16),
        }
    }

    /// Returns the record type if this is a struct shape.
    pub fn as_record(&self) -> Option<&RecordType> {
        match self {
            Shape::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// Returns the cursor position after laying out `count` elements starting at `offset`.
///
/// All alignments divide `MAX_ALIGNMENT`, so where an element ends depends only
/// on where it starts modulo `MAX_ALIGNMENT`. The per-element advance therefore
/// repeats within `MAX_ALIGNMENT` elements, and whole repetitions are skipped
/// arithmetically instead of walking every element.
fn array_end(element: &Shape, count: usize, offset: usize, depth: usize) -> Result<usize> {
    let mut seen: [Option<(usize, usize)>; MAX_ALIGNMENT] = [None; MAX_ALIGNMENT];
    let mut offset = offset;
    let mut index = 0;
    while index < count {
        let residue = offset % MAX_ALIGNMENT;
        if let Some((first_index, first_offset)) = seen[residue].take() {
            let period = index - first_index;
            let cycles = (count - index) / period;
            offset = cycles
                .checked_mul(offset - first_offset)
                .and_then(|advance| offset.checked_add(advance))
                .ok_or(Error::OutOfRange)?;
            index += cycles * period;
            // Fewer than `period` elements remain, so no residue repeats again.
            seen = [None; MAX_ALIGNMENT];
            if index == count {
                break;
            }
        }
        seen[offset % MAX_ALIGNMENT] = Some((index, offset));
        offset = element.layout_end(offset, depth)?;
        index += 1;
    }
    Ok(offset)
}

impl From<PrimitiveKind> for Shape {
    fn from(kind: PrimitiveKind) -> Self {
        Shape::Primitive(kind)
    }
}

impl From<RecordType> for Shape {
    fn from(record: RecordType) -> Self {
        Shape::Record(record)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Primitive(kind) => f.write_str(kind.name()),
            Shape::Array { element, count } => write!(f, "array<{}>:{}", element, count),
            Shape::Record(record) => write!(f, "struct {}", record.name()),
            Shape::Handle { nullable } => write!(f, "handle{}", if *nullable { "?" } else { "" }),
            Shape::String { nullable } => write!(f, "string{}", if *nullable { "?" } else { "" }),
            Shape::Vector { element, nullable } => {
                write!(f, "vector<{}>{}", element, if *nullable { "?" } else { "" })
            }
        }
    }
}

/// A named field of a struct.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldType {
    /// Field name, used for diagnostics only.
    pub name: Cow<'static, str>,
    /// Shape of the field.
    pub shape: Shape,
}

impl FieldType {
    /// Creates a new field description.
    pub fn new(name: impl Into<Cow<'static, str>>, shape: impl Into<Shape>) -> Self {
        FieldType { name: name.into(), shape: shape.into() }
    }
}

/// Description of a struct: its declared inline alignment and its fields in declaration order.
///
/// Fields that are not serialized are not part of the description.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordType {
    name: Cow<'static, str>,
    alignment: usize,
    fields: Vec<FieldType>,
}

impl RecordType {
    /// Creates a new struct description.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        alignment: usize,
        fields: Vec<FieldType>,
    ) -> Self {
        RecordType { name: name.into(), alignment, fields }
    }

    /// The name of the struct.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared inline alignment of the struct.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// The serialized fields, in declaration order.
    pub fn fields(&self) -> &[FieldType] {
        &self.fields
    }

    /// The number of bytes spanned by the struct's fields, starting at its first byte.
    pub fn inline_size(&self) -> Result<usize> {
        self.layout_end(0, MAX_RECURSION)
    }

    fn layout_end(&self, offset: usize, depth: usize) -> Result<usize> {
        self.check_alignment()?;
        let depth = depth.checked_sub(1).ok_or(Error::MaxRecursionDepth)?;
        if self.fields.is_empty() {
            // An empty struct is encoded as a single zero byte.
            return place(offset, self.alignment, 1);
        }
        let start = place(offset, self.alignment, 0)?;
        self.fields.iter().try_fold(start, |offset, field| field.shape.layout_end(offset, depth))
    }

    /// Checks that the declared alignment is a power of two no larger than `MAX_ALIGNMENT`.
    pub fn check_alignment(&self) -> Result<()> {
        if !self.alignment.is_power_of_two() || self.alignment > MAX_ALIGNMENT {
            return Err(Error::InvalidAlignment {
                record: self.name.to_string(),
                alignment: self.alignment,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {super::*, assert_matches::assert_matches, proptest::prelude::*, test_case::test_case};

    fn uint(width: usize) -> Shape {
        match width {
            1 => PrimitiveKind::Uint8.into(),
            2 => PrimitiveKind::Uint16.into(),
            4 => PrimitiveKind::Uint32.into(),
            _ => PrimitiveKind::Uint64.into(),
        }
    }

    #[test_case(0, 8 => 0)]
    #[test_case(1, 8 => 8)]
    #[test_case(8, 8 => 8)]
    #[test_case(9, 4 => 12)]
    #[test_case(5, 2 => 6)]
    #[test_case(7, 1 => 7)]
    fn align_rounds_up(size: usize, boundary: usize) -> usize {
        align(size, boundary)
    }

    proptest! {
        #[test]
        fn align_is_smallest_multiple(size in 0usize..(u32::MAX as usize), exp in 0u32..7) {
            let boundary = 1usize << exp;
            let aligned = align(size, boundary);
            prop_assert_eq!(aligned % boundary, 0);
            prop_assert!(aligned >= size);
            prop_assert!(aligned <= size + boundary - 1);
            prop_assert_eq!(checked_align(size, boundary), Some(aligned));
        }
    }

    #[test]
    fn checked_align_detects_overflow() {
        assert_eq!(checked_align(usize::MAX - 7, 8), Some(usize::MAX - 7));
        assert_eq!(checked_align(usize::MAX - 2, 8), None);
        assert_eq!(checked_align(usize::MAX, 1), Some(usize::MAX));
    }

    fn element_shape() -> impl Strategy<Value = Shape> {
        let leaf = prop_oneof![
            prop::sample::select(vec![1usize, 2, 4, 8]).prop_map(uint),
            Just(Shape::Handle { nullable: false }),
            Just(Shape::String { nullable: true }),
        ];
        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                (inner.clone(), 0usize..4).prop_map(|(element, count)| Shape::Array {
                    element: Box::new(element),
                    count,
                }),
                (prop::collection::vec(inner, 0..3), 0u32..4).prop_map(|(shapes, exp)| {
                    let fields = shapes.into_iter().map(|shape| FieldType::new("f", shape));
                    Shape::Record(RecordType::new("R", 1 << exp, fields.collect()))
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn array_layout_matches_element_walk(
            element in element_shape(),
            count in 0usize..40,
            offset in 0usize..16,
        ) {
            let walked = (0..count).try_fold(offset, |offset, _| {
                element.layout_end(offset, MAX_RECURSION)
            });
            prop_assert_eq!(array_end(&element, count, offset, MAX_RECURSION), walked);
        }
    }

    #[test]
    fn primitive_widths() {
        assert_eq!(PrimitiveKind::Bool.width(), 1);
        assert_eq!(PrimitiveKind::Int16.width(), 2);
        assert_eq!(PrimitiveKind::Float32.width(), 4);
        assert_eq!(PrimitiveKind::Uint64.width(), 8);
    }

    #[test]
    fn record_packs_fields_at_natural_alignment() {
        let record = RecordType::new(
            "Scalars",
            4,
            vec![FieldType::new("a", uint(4)), FieldType::new("b", uint(1))],
        );
        assert_eq!(record.inline_size(), Ok(5));

        let record = RecordType::new(
            "Gappy",
            8,
            vec![FieldType::new("a", uint(1)), FieldType::new("b", uint(8))],
        );
        assert_eq!(record.inline_size(), Ok(16));
    }

    #[test]
    fn empty_record_is_one_byte() {
        assert_eq!(RecordType::new("Empty", 1, vec![]).inline_size(), Ok(1));
    }

    #[test]
    fn array_of_records_aligns_each_element() {
        let element = RecordType::new(
            "Pair",
            4,
            vec![FieldType::new("a", uint(4)), FieldType::new("b", uint(1))],
        );
        let array = Shape::Array { element: Box::new(element.into()), count: 2 };
        // Second element starts at 8, not 5.
        assert_eq!(array.inline_size(), Ok(13));
        assert_eq!(array.inline_alignment(), 4);
    }

    #[test]
    fn out_of_line_shapes_have_envelope_size() {
        let record = RecordType::new(
            "WithString",
            8,
            vec![
                FieldType::new("flag", PrimitiveKind::Bool),
                FieldType::new("name", Shape::String { nullable: false }),
            ],
        );
        assert_eq!(record.inline_size(), Ok(24));
    }

    #[test_case(0)]
    #[test_case(3)]
    #[test_case(16)]
    fn validate_rejects_bad_alignment(alignment: usize) {
        let inner = RecordType::new("Inner", alignment, vec![]);
        let array = Shape::Array { element: Box::new(inner.into()), count: 1 };
        let outer =
            Shape::Record(RecordType::new("Outer", 8, vec![FieldType::new("inner", array)]));
        assert_matches!(
            outer.validate(),
            Err(Error::InvalidAlignment { record, alignment: a })
                if record == "Inner" && a == alignment
        );
    }

    #[test]
    fn long_arrays_skip_repeating_placements() {
        let element = RecordType::new(
            "Pair",
            4,
            vec![FieldType::new("a", uint(4)), FieldType::new("b", uint(1))],
        );
        // Every element after the first starts 8 bytes after the previous one.
        let count = usize::MAX / 16;
        let array = Shape::Array { element: Box::new(element.into()), count };
        assert_eq!(array.inline_size(), Ok((count - 1) * 8 + 5));

        // Elements end at 3, 7, 11, ...: only the first one starts unpadded.
        let mixed = RecordType::new(
            "Mixed",
            1,
            vec![FieldType::new("a", uint(2)), FieldType::new("b", uint(1))],
        );
        let array = Shape::Array { element: Box::new(mixed.into()), count: 1001 };
        assert_eq!(array.inline_size(), Ok(4003));

        let array = Shape::Array {
            element: Box::new(Shape::Array { element: Box::new(uint(1)), count: 0 }),
            count: usize::MAX,
        };
        assert_eq!(array.inline_size(), Ok(0));
    }

    #[test_case(usize::MAX, 8)]
    #[test_case(usize::MAX / 8 + 1, 8)]
    #[test_case(usize::MAX, 2)]
    fn oversized_arrays_are_out_of_range(count: usize, width: usize) {
        let array = Shape::Array { element: Box::new(uint(width)), count };
        assert_eq!(array.inline_size(), Err(Error::OutOfRange));
        let outer = Shape::Array { element: Box::new(array), count: 2 };
        assert_eq!(outer.validate(), Err(Error::OutOfRange));
    }

    #[test]
    fn layout_depth_is_bounded() {
        let mut shape = uint(1);
        for _ in 0..MAX_RECURSION {
            shape = Shape::Array { element: Box::new(shape), count: 1 };
        }
        assert_eq!(shape.inline_size(), Ok(1));
        assert_eq!(shape.inline_size_with_depth(MAX_RECURSION - 1), Err(Error::MaxRecursionDepth));

        let mut deep = shape;
        for _ in 0..1000 {
            deep = Shape::Record(RecordType::new("Deep", 1, vec![FieldType::new("deep", deep)]));
        }
        assert_eq!(deep.validate(), Err(Error::MaxRecursionDepth));
        assert_eq!(deep.inline_alignment(), 1);
    }

    #[test]
    fn display_names_types() {
        let shape = Shape::Array { element: Box::new(PrimitiveKind::Int16.into()), count: 4 };
        assert_eq!(shape.to_string(), "array<int16>:4");
        assert_eq!(Shape::Handle { nullable: true }.to_string(), "handle?");
        assert_eq!(
            Shape::Vector { element: Box::new(PrimitiveKind::Uint8.into()), nullable: false }
                .to_string(),
            "vector<uint8>"
        );
        assert_eq!(Shape::Record(RecordType::new("Foo", 1, vec![])).to_string(), "struct Foo");
    }
}
