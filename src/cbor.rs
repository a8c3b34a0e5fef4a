// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Minimal CBOR reading and writing.
//!
//! This is not a complete CBOR parser: it handles only what is needed to
//! decode component identifiers and key IDs handed over by the manifest
//! interpreter. We reject all CBOR that is not encoded according to
//! RFC 8949 S4.2.1 "Core Deterministic Encoding Requirements"; in
//! particular, arguments must be minimally encoded and indefinite lengths
//! are banned.
//!
//! Maps, tags, floats and simple values are not supported, and neither are
//! 64-bit arguments.
//!
//! See: https://datatracker.ietf.org/doc/html/rfc8949

use core::convert::TryInto as _;

use crate::status::Classify;
use crate::status::ErrorKind;

/// A CBOR encoding error.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// The input ended before an item was complete.
    Truncated,
    /// The input was not deterministically encoded, or used a construct this
    /// parser does not understand.
    BadEncoding,
    /// An item was well-formed, but of the wrong type or out of range.
    Unexpected,
    /// The output buffer was too small for an encoding.
    BufferExhausted,
}

impl From<untrusted::EndOfInput> for Error {
    fn from(_: untrusted::EndOfInput) -> Self {
        Self::Truncated
    }
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::BufferExhausted => ErrorKind::Resources,
            _ => ErrorKind::Decoding,
        }
    }
}

/// A CBOR 33-bit integer.
///
/// CBOR integers are a sign-and-magnitude encoding that maps onto N+1-bit
/// integers.
// When the bool part is `false`, the value is just the `u32` part; when it's
// `true`, the value is `-n-1`, where n is the `u32` part.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Int(bool, u32);

impl Int {
    /// Creates a non-negative integer.
    pub const fn from_u32(n: u32) -> Self {
        Int(false, n)
    }

    /// Creates a possibly-negative integer.
    pub const fn from_i32(n: i32) -> Self {
        if n >= 0 {
            Int(false, n as u32)
        } else {
            Int(true, -(n + 1) as u32)
        }
    }

    /// Returns this integer as a `u32`, if it is non-negative.
    pub fn to_u32(self) -> Option<u32> {
        match self {
            Int(false, n) => Some(n),
            _ => None,
        }
    }

    /// Returns this integer as an `i32`, if it fits.
    pub fn to_i32(self) -> Option<i32> {
        let n: i32 = self.1.try_into().ok()?;
        Some(if self.0 { -n - 1 } else { n })
    }
}

/// A CBOR item.
#[must_use = "parsing will not be driven to completion without consuming \
this value"]
pub enum Item<'input, 'reader> {
    /// An integer, major types 0 and 1.
    Int(Int),
    /// A byte string.
    Bytes(&'input [u8]),
    /// A text string.
    Utf8(&'input str),
    /// An array, whose elements still need to be read.
    Array(Array<'input, 'reader>),
}

impl<'i, 'r> Item<'i, 'r> {
    /// Parses a single CBOR item.
    pub fn parse(buf: &'r mut untrusted::Reader<'i>) -> Result<Self, Error> {
        let initial = buf.read_byte()?;

        // For determinism, we *require* that the minimal encoding is used.
        let argument = match initial & 0b00011111 {
            b @ 0..=23 => b as u32,
            24 => {
                let n = buf.read_byte()?;
                if n < 24 {
                    return Err(Error::BadEncoding);
                }
                n as u32
            }
            25 => {
                let n = u16::from_be_bytes(read_array(buf)?);
                if n <= u8::MAX as u16 {
                    return Err(Error::BadEncoding);
                }
                n as u32
            }
            26 => {
                let n = u32::from_be_bytes(read_array(buf)?);
                if n <= u16::MAX as u32 {
                    return Err(Error::BadEncoding);
                }
                n
            }
            // 27 is 64-bit arguments, which we don't handle;
            // 28-30 are reserved;
            // 31 is indefinite-length encoding, which is banned.
            _ => return Err(Error::BadEncoding),
        };

        match initial >> 5 {
            sign @ 0..=1 => Ok(Item::Int(Int(sign == 1, argument))),
            2 => Ok(Item::Bytes(
                buf.read_bytes(argument as usize)?.as_slice_less_safe(),
            )),
            3 => {
                let bytes =
                    buf.read_bytes(argument as usize)?.as_slice_less_safe();
                core::str::from_utf8(bytes)
                    .map(Item::Utf8)
                    .map_err(|_| Error::BadEncoding)
            }
            4 => Ok(Item::Array(Array { buf, len: argument })),
            _ => Err(Error::BadEncoding),
        }
    }

    /// Folds this item into an [`Int`].
    pub fn into_int(self) -> Result<Int, Error> {
        match self {
            Item::Int(i) => Ok(i),
            _ => Err(Error::Unexpected),
        }
    }

    /// Folds this item into a non-negative `u32`.
    pub fn into_u32(self) -> Result<u32, Error> {
        self.into_int()?.to_u32().ok_or(Error::Unexpected)
    }

    /// Folds this item into a UTF-8 string.
    pub fn into_utf8(self) -> Result<&'i str, Error> {
        match self {
            Item::Utf8(s) => Ok(s),
            _ => Err(Error::Unexpected),
        }
    }

    /// Folds this item into a byte string.
    pub fn into_bytes(self) -> Result<&'i [u8], Error> {
        match self {
            Item::Bytes(b) => Ok(b),
            _ => Err(Error::Unexpected),
        }
    }

    /// Folds this item into an [`Array`].
    pub fn into_array(self) -> Result<Array<'i, 'r>, Error> {
        match self {
            Item::Array(a) => Ok(a),
            _ => Err(Error::Unexpected),
        }
    }

    /// Folds this item into a byte string and parses exactly one item out
    /// of it, running `f` on that item.
    pub fn unwrap_bstr<R>(
        self,
        f: impl FnOnce(Item<'i, '_>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        read_one(self.into_bytes()?, f)
    }
}

/// Parses exactly one item out of `bytes`, rejecting trailing data.
pub fn read_one<'i, R>(
    bytes: &'i [u8],
    f: impl FnOnce(Item<'i, '_>) -> Result<R, Error>,
) -> Result<R, Error> {
    let mut reader = untrusted::Reader::new(untrusted::Input::from(bytes));
    let val = f(Item::parse(&mut reader)?)?;
    if !reader.at_end() {
        return Err(Error::BadEncoding);
    }
    Ok(val)
}

fn read_array<const N: usize>(
    buf: &mut untrusted::Reader,
) -> Result<[u8; N], Error> {
    buf.read_bytes(N)?
        .as_slice_less_safe()
        .try_into()
        .map_err(|_| Error::Truncated)
}

// NOTE: Array cannot be an iterator, because the result value needs to
// capture the &mut self lifetime.

/// A CBOR array.
#[must_use = "parsing will not be driven to completion without calling `with()`"]
pub struct Array<'input, 'reader> {
    buf: &'reader mut untrusted::Reader<'input>,
    len: u32,
}

impl<'i, 'r> Array<'i, 'r> {
    /// Returns the number of elements in this array.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns whether this array is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Runs `body` on each item in the array, along with its index, until
    /// completion or parse failure.
    pub fn with(
        self,
        mut body: impl FnMut(u32, Item<'i, '_>) -> Result<(), Error>,
    ) -> Result<(), Error> {
        for i in 0..self.len {
            body(i, Item::parse(&mut *self.buf)?)?
        }
        Ok(())
    }
}

/// A writer for deterministically-encoded CBOR into a fixed buffer.
pub struct Encoder<'buf> {
    buf: &'buf mut [u8],
    len: usize,
}

impl<'buf> Encoder<'buf> {
    /// Creates a new encoder writing to the start of `buf`.
    pub fn new(buf: &'buf mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finishes encoding, returning the written prefix of the buffer.
    pub fn finish(self) -> &'buf [u8] {
        &self.buf[..self.len]
    }

    /// Writes raw bytes, with no CBOR framing.
    pub fn raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self
            .len
            .checked_add(bytes.len())
            .filter(|&end| end <= self.buf.len())
            .ok_or(Error::BufferExhausted)?;
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    /// Writes an initial byte plus minimally-encoded argument.
    pub fn head(&mut self, major: u8, arg: u32) -> Result<(), Error> {
        let ty = major << 5;
        match arg {
            0..=23 => self.raw(&[ty | arg as u8]),
            24..=0xff => self.raw(&[ty | 24, arg as u8]),
            0x100..=0xffff => {
                self.raw(&[ty | 25])?;
                self.raw(&(arg as u16).to_be_bytes())
            }
            _ => {
                self.raw(&[ty | 26])?;
                self.raw(&arg.to_be_bytes())
            }
        }
    }

    /// Writes an integer.
    pub fn int(&mut self, n: Int) -> Result<(), Error> {
        self.head(n.0 as u8, n.1)
    }

    /// Writes a byte string.
    pub fn bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.head(2, bytes.len() as u32)?;
        self.raw(bytes)
    }

    /// Writes a text string.
    pub fn utf8(&mut self, s: &str) -> Result<(), Error> {
        self.head(3, s.len() as u32)?;
        self.raw(s.as_bytes())
    }

    /// Writes an array header for `len` elements; the elements themselves
    /// must be written next.
    pub fn array(&mut self, len: u32) -> Result<(), Error> {
        self.head(4, len)
    }

    /// Writes a byte string containing whatever `f` encodes.
    ///
    /// The inner encoding is built in place and then shifted right to make
    /// room for the byte string header.
    pub fn wrapped(
        &mut self,
        f: impl FnOnce(&mut Encoder) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let start = self.len;
        let inner_len = {
            let mut inner = Encoder::new(&mut self.buf[start..]);
            f(&mut inner)?;
            inner.len()
        };

        let mut head = [0; 5];
        let head_len = {
            let mut e = Encoder::new(&mut head);
            e.head(2, inner_len as u32)?;
            e.len()
        };
        let end = start + head_len + inner_len;
        if end > self.buf.len() {
            return Err(Error::BufferExhausted);
        }
        self.buf.copy_within(start..start + inner_len, start + head_len);
        self.buf[start..start + head_len].copy_from_slice(&head[..head_len]);
        self.len = end;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_int(bytes: &[u8]) -> Result<Int, Error> {
        read_one(bytes, |i| i.into_int())
    }

    #[test]
    fn ints() {
        assert_eq!(parse_int(&[0x17]), Ok(Int::from_u32(23)));
        assert_eq!(parse_int(&[0x18, 0x18]), Ok(Int::from_u32(24)));
        assert_eq!(parse_int(&[0x19, 0x01, 0x00]), Ok(Int::from_u32(256)));
        assert_eq!(parse_int(&[0x20]), Ok(Int::from_i32(-1)));
        assert_eq!(parse_int(&[0x38, 0x63]).unwrap().to_i32(), Some(-100));
    }

    #[test]
    fn non_minimal() {
        assert_eq!(parse_int(&[0x18, 0x17]), Err(Error::BadEncoding));
        assert_eq!(parse_int(&[0x19, 0x00, 0xff]), Err(Error::BadEncoding));
        assert_eq!(
            parse_int(&[0x1a, 0x00, 0x00, 0xff, 0xff]),
            Err(Error::BadEncoding)
        );
        assert_eq!(parse_int(&[0x1b, 0, 0, 0, 0, 0, 0, 0, 1]), Err(Error::BadEncoding));
        // Indefinite-length byte string.
        assert_eq!(
            read_one(&[0x5f, 0x41, 0x00, 0xff], |i| i.into_bytes().map(|_| ())),
            Err(Error::BadEncoding)
        );
    }

    #[test]
    fn truncated_and_trailing() {
        assert_eq!(parse_int(&[0x19, 0x01]), Err(Error::Truncated));
        assert_eq!(parse_int(&[0x01, 0x02]), Err(Error::BadEncoding));
        assert_eq!(
            read_one(&[0x43, 0x01], |i| i.into_bytes().map(|_| ())),
            Err(Error::Truncated)
        );
    }

    #[test]
    fn arrays() {
        let bytes = [0x83, 0x01, 0x41, 0xaa, 0x63, b'a', b'b', b'c'];
        let mut seen = 0;
        read_one(&bytes, |i| {
            let a = i.into_array()?;
            assert_eq!(a.len(), 3);
            a.with(|idx, item| {
                seen += 1;
                match idx {
                    0 => assert_eq!(item.into_u32()?, 1),
                    1 => assert_eq!(item.into_bytes()?, &[0xaa]),
                    _ => assert_eq!(item.into_utf8()?, "abc"),
                }
                Ok(())
            })
        })
        .unwrap();
        assert_eq!(seen, 3);
    }

    #[test]
    fn encode() {
        let mut buf = [0; 32];
        let mut e = Encoder::new(&mut buf);
        e.array(2).unwrap();
        e.wrapped(|e| e.utf8("MEM")).unwrap();
        e.wrapped(|e| e.int(Int::from_u32(0x1000))).unwrap();
        assert_eq!(
            e.finish(),
            &[0x82, 0x44, 0x63, b'M', b'E', b'M', 0x43, 0x19, 0x10, 0x00]
        );
    }

    #[test]
    fn encode_exhausted() {
        let mut buf = [0; 4];
        let mut e = Encoder::new(&mut buf);
        assert_eq!(e.bytes(&[1, 2, 3, 4]), Err(Error::BufferExhausted));
        let mut buf = [0; 4];
        let mut e = Encoder::new(&mut buf);
        assert_eq!(e.wrapped(|e| e.utf8("abc")), Err(Error::BufferExhausted));
    }
}
