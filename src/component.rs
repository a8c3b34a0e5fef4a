// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Component identifiers.
//!
//! A component identifier names something a manifest can act on: a range of
//! memory, a staged candidate, a cache partition, a special secure-domain
//! image, or another installed manifest. On the wire it is a CBOR array of
//! byte strings, the first of which wraps a text string naming the type:
//! ```text
//! ["MEM", cpu_id, address, size]
//! ["CAND_IMG", n]
//! ["CAND_MFST", n]
//! ["CACHE_POOL", n]
//! ["SPECIAL", n]
//! ["INSTLD_MFST", class_uuid]
//! ```
//! All fields except the class UUID are byte strings wrapping a CBOR
//! integer; the class UUID is a bare 16-byte string.
//!
//! [`ComponentId::decode()`] is the only place in this crate where the wire
//! form is interpreted; everything downstream matches on [`ComponentId`].

use core::fmt;
use core::str::FromStr;

use arrayvec::ArrayVec;

#[cfg(feature = "arbitrary-derive")]
use libfuzzer_sys::arbitrary::{self, Arbitrary};

use crate::cbor;
use crate::cbor::Int;
use crate::status::Classify;
use crate::status::ErrorKind;

/// The largest encoded component ID this crate will produce.
pub const MAX_ENCODED_LEN: usize = 48;

/// A 16-byte RFC 4122 UUID, used for manifest vendor and class IDs.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "arbitrary-derive", derive(Arbitrary))]
pub struct Uuid(pub [u8; 16]);

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// An error parsing a [`Uuid`] from its textual form.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct UuidFromStrError;

impl FromStr for Uuid {
    type Err = UuidFromStrError;

    /// Parses the hyphenated form, e.g.
    /// `3f6a3a4d-cdfa-58c5-acce-f9f584c41124`.
    fn from_str(s: &str) -> Result<Self, UuidFromStrError> {
        let s = s.as_bytes();
        if s.len() != 36 {
            return Err(UuidFromStrError);
        }

        let mut out = [0; 16];
        let mut digits = s
            .iter()
            .enumerate()
            .filter(|&(i, &c)| !(matches!(i, 8 | 13 | 18 | 23) && c == b'-'))
            .map(|(_, &c)| (c as char).to_digit(16));
        for byte in &mut out {
            let hi = digits.next().flatten().ok_or(UuidFromStrError)?;
            let lo = digits.next().flatten().ok_or(UuidFromStrError)?;
            *byte = (hi << 4 | lo) as u8;
        }
        if digits.next().is_some() {
            return Err(UuidFromStrError);
        }
        Ok(Uuid(out))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Uuid {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Uuid {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct Visitor;
        impl serde::de::Visitor<'_> for Visitor {
            type Value = Uuid;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a hyphenated UUID")
            }

            fn visit_str<E: serde::de::Error>(self, s: &str) -> Result<Uuid, E> {
                s.parse().map_err(|_| {
                    E::invalid_value(serde::de::Unexpected::Str(s), &self)
                })
            }
        }
        d.deserialize_str(Visitor)
    }
}

/// A decoded component identifier.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "arbitrary-derive", derive(Arbitrary))]
pub enum ComponentId {
    /// A range of memory, as seen by the processor `cpu_id`.
    Mem {
        /// The processor (domain) the address is relative to.
        cpu_id: i32,
        /// The first byte of the range.
        address: u32,
        /// The length of the range, in bytes.
        size: u32,
    },
    /// A staged candidate image, by index.
    CandidateImage(u32),
    /// A staged candidate manifest, by index.
    CandidateManifest(u32),
    /// A DFU cache partition, by index.
    CachePool(u32),
    /// A special component, handled by the secure domain.
    Special(u32),
    /// The installed manifest of the given class.
    InstalledManifest(Uuid),
}

/// An error decoding a [`ComponentId`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// The underlying CBOR was malformed.
    Cbor(cbor::Error),
    /// The type name is not one this crate understands.
    UnknownType,
    /// The number of fields does not match the type.
    WrongArity,
    /// A field could not be converted into the expected range.
    BadField,
}

impl From<cbor::Error> for Error {
    fn from(e: cbor::Error) -> Self {
        Self::Cbor(e)
    }
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Cbor(e) => e.kind(),
            _ => ErrorKind::Decoding,
        }
    }
}

debug_from!(Error => cbor::Error);

const MEM: &str = "MEM";
const CAND_IMG: &str = "CAND_IMG";
const CAND_MFST: &str = "CAND_MFST";
const CACHE_POOL: &str = "CACHE_POOL";
const SPECIAL: &str = "SPECIAL";
const INSTLD_MFST: &str = "INSTLD_MFST";

impl ComponentId {
    /// Decodes a component ID from its CBOR encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, crate::Error<Error>> {
        match Self::decode_inner(bytes) {
            Ok(id) => {
                trace!("decoded component id: {:?}", id);
                Ok(id)
            }
            Err(e) => fail!(e, "bad component id {:02x?}: {:?}", bytes, e),
        }
    }

    fn decode_inner(bytes: &[u8]) -> Result<Self, Error> {
        let mut name = "";
        let mut fields = ArrayVec::<&[u8], 3>::new();
        cbor::read_one(bytes, |item| {
            let array = item.into_array()?;
            if array.is_empty() || array.len() > 4 {
                return Err(cbor::Error::Unexpected);
            }
            array.with(|i, item| {
                if i == 0 {
                    name = item.unwrap_bstr(|s| s.into_utf8())?;
                } else {
                    fields.push(item.into_bytes()?);
                }
                Ok(())
            })
        })?;

        let id = match (name, fields.as_slice()) {
            (MEM, &[cpu_id, address, size]) => ComponentId::Mem {
                cpu_id: int_field(cpu_id)?.to_i32().ok_or(Error::BadField)?,
                address: uint_field(address)?,
                size: uint_field(size)?,
            },
            (CAND_IMG, &[n]) => ComponentId::CandidateImage(uint_field(n)?),
            (CAND_MFST, &[n]) => ComponentId::CandidateManifest(uint_field(n)?),
            (CACHE_POOL, &[n]) => ComponentId::CachePool(uint_field(n)?),
            (SPECIAL, &[n]) => ComponentId::Special(uint_field(n)?),
            (INSTLD_MFST, &[uuid]) => {
                let mut class = Uuid::default();
                if uuid.len() != class.0.len() {
                    return Err(Error::BadField);
                }
                class.0.copy_from_slice(uuid);
                ComponentId::InstalledManifest(class)
            }
            (MEM, _) | (CAND_IMG, _) | (CAND_MFST, _) | (CACHE_POOL, _)
            | (SPECIAL, _) | (INSTLD_MFST, _) => return Err(Error::WrongArity),
            _ => return Err(Error::UnknownType),
        };
        Ok(id)
    }

    /// Encodes this component ID into `buf`, returning the encoded prefix.
    pub fn encode<'b>(
        &self,
        buf: &'b mut [u8],
    ) -> Result<&'b [u8], crate::Error<Error>> {
        let mut e = cbor::Encoder::new(buf);
        let written = match *self {
            ComponentId::Mem {
                cpu_id,
                address,
                size,
            } => e.array(4).and_then(|_| {
                e.wrapped(|e| e.utf8(MEM))?;
                e.wrapped(|e| e.int(Int::from_i32(cpu_id)))?;
                e.wrapped(|e| e.int(Int::from_u32(address)))?;
                e.wrapped(|e| e.int(Int::from_u32(size)))
            }),
            ComponentId::CandidateImage(n) => encode_indexed(&mut e, CAND_IMG, n),
            ComponentId::CandidateManifest(n) => {
                encode_indexed(&mut e, CAND_MFST, n)
            }
            ComponentId::CachePool(n) => encode_indexed(&mut e, CACHE_POOL, n),
            ComponentId::Special(n) => encode_indexed(&mut e, SPECIAL, n),
            ComponentId::InstalledManifest(class) => {
                e.array(2).and_then(|_| {
                    e.wrapped(|e| e.utf8(INSTLD_MFST))?;
                    e.bytes(&class.0)
                })
            }
        };
        match written {
            Ok(()) => Ok(e.finish()),
            Err(err) => fail!(Error::Cbor(err)),
        }
    }

    /// Returns the wire name of this component's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ComponentId::Mem { .. } => MEM,
            ComponentId::CandidateImage(_) => CAND_IMG,
            ComponentId::CandidateManifest(_) => CAND_MFST,
            ComponentId::CachePool(_) => CACHE_POOL,
            ComponentId::Special(_) => SPECIAL,
            ComponentId::InstalledManifest(_) => INSTLD_MFST,
        }
    }
}

fn encode_indexed(
    e: &mut cbor::Encoder,
    name: &str,
    n: u32,
) -> Result<(), cbor::Error> {
    e.array(2)?;
    e.wrapped(|e| e.utf8(name))?;
    e.wrapped(|e| e.int(Int::from_u32(n)))
}

fn int_field(bytes: &[u8]) -> Result<Int, Error> {
    Ok(cbor::read_one(bytes, |i| i.into_int())?)
}

fn uint_field(bytes: &[u8]) -> Result<u32, Error> {
    int_field(bytes)?.to_u32().ok_or(Error::BadField)
}
