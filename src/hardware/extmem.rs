// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Memory owned by another processor.
//!
//! Some destinations (external flash behind an application core, for
//! example) are not directly addressable by the update core. They are
//! reached by sending a [`Request`] through a [`Transport`] and blocking
//! until the remote side answers. [`ExtMem`] wraps such a transport into a
//! [`Flash`], so that the rest of the crate does not need to care.
//!
//! The wire format of the transport is the implementation's business.

use core::cell::Cell;
use core::cell::RefCell;

use crate::hardware::flash::Capabilities;
use crate::hardware::flash::Flash;
use crate::hardware::flash::Ptr;
use crate::hardware::flash::Region;
use crate::hardware::Error;

/// A request to the remote memory service.
#[derive(Debug)]
pub enum Request<'a> {
    /// Asks for the geometry of the remote memory.
    Capabilities,
    /// Reads `out.len()` bytes at `offset` into `out`.
    Read {
        /// The device offset to read from.
        offset: Ptr,
        /// The buffer to read into.
        out: &'a mut [u8],
    },
    /// Writes `data` at `offset`.
    Write {
        /// The device offset to write to.
        offset: Ptr,
        /// The data to write.
        data: &'a [u8],
    },
    /// Erases `region`.
    Erase(Region),
}

/// A reply from the remote memory service.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// The answer to [`Request::Capabilities`].
    Capabilities(Capabilities),
    /// The request completed.
    Done,
    /// The remote side refused or failed the request.
    Failed,
}

/// A blocking request/reply channel to a remote memory service.
pub trait Transport {
    /// Sends `request` and blocks until a reply arrives or the transport's
    /// timeout elapses.
    ///
    /// Returns `Ok(None)` on timeout.
    fn exchange(&mut self, request: Request) -> Result<Option<Reply>, Error>;
}

/// A [`Flash`] implemented on top of a [`Transport`].
///
/// The remote geometry is queried once, on first use, and cached.
pub struct ExtMem<T> {
    transport: RefCell<T>,
    caps: Cell<Option<Capabilities>>,
}

impl<T: Transport> ExtMem<T> {
    /// Creates a new `ExtMem` over `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport: RefCell::new(transport),
            caps: Cell::new(None),
        }
    }

    /// Returns the underlying transport.
    pub fn into_inner(self) -> T {
        self.transport.into_inner()
    }

    fn exchange(&self, request: Request) -> Result<Reply, Error> {
        let mut transport = self
            .transport
            .try_borrow_mut()
            .map_err(|_| Error::Locked)?;
        match transport.exchange(request)? {
            Some(Reply::Failed) => Err(Error::Unspecified),
            Some(reply) => Ok(reply),
            None => {
                warn!("external memory request timed out");
                Err(Error::Timeout)
            }
        }
    }

    fn check(&self, region: Region) -> Result<(), Error> {
        let caps = self.capabilities()?;
        if !Region::new(0, caps.size).contains(region) {
            return Err(Error::OutOfRange);
        }
        Ok(())
    }
}

impl<T: Transport> Flash for ExtMem<T> {
    fn capabilities(&self) -> Result<Capabilities, Error> {
        if let Some(caps) = self.caps.get() {
            return Ok(caps);
        }
        match self.exchange(Request::Capabilities)? {
            Reply::Capabilities(caps) => {
                trace!("external memory capabilities: {:?}", caps);
                self.caps.set(Some(caps));
                Ok(caps)
            }
            _ => Err(Error::Unspecified),
        }
    }

    fn read(&self, offset: Ptr, out: &mut [u8]) -> Result<(), Error> {
        self.check(Region::new(offset.address, out.len() as u32))?;
        self.exchange(Request::Read { offset, out }).map(|_| ())
    }

    fn program(&mut self, offset: Ptr, data: &[u8]) -> Result<(), Error> {
        self.check(Region::new(offset.address, data.len() as u32))?;
        self.exchange(Request::Write { offset, data }).map(|_| ())
    }

    fn erase(&mut self, region: Region) -> Result<(), Error> {
        self.check(region)?;
        self.exchange(Request::Erase(region)).map(|_| ())
    }
}

#[cfg(feature = "std")]
pub mod fake {
    //! A fake [`Transport`](super::Transport), served from a heap buffer.

    use super::*;
    use crate::hardware::flash::RamFlash;

    /// A fake remote memory service.
    pub struct Transport {
        memory: RamFlash<Vec<u8>>,
        write_align: u32,
        /// When set, every request goes unanswered.
        pub silent: bool,
        /// The number of requests received so far.
        pub requests: usize,
    }

    impl Transport {
        /// Creates a new remote memory of `size` bytes mapped at `base`.
        pub fn new(base: u32, size: u32, erase_block: u32) -> Self {
            Self {
                memory: RamFlash::new(vec![0xff; size as usize], base, erase_block),
                write_align: 1,
                silent: false,
                requests: 0,
            }
        }

        /// Returns the remote memory's contents.
        pub fn memory(&self) -> &[u8] {
            self.memory.bytes()
        }
    }

    impl super::Transport for Transport {
        fn exchange(
            &mut self,
            request: Request,
        ) -> Result<Option<Reply>, Error> {
            self.requests += 1;
            if self.silent {
                return Ok(None);
            }

            let result = match request {
                Request::Capabilities => {
                    let caps = self.memory.capabilities()?;
                    return Ok(Some(Reply::Capabilities(Capabilities {
                        write_align: self.write_align,
                        ..caps
                    })));
                }
                Request::Read { offset, out } => self.memory.read(offset, out),
                Request::Write { offset, data } => {
                    self.memory.program(offset, data)
                }
                Request::Erase(region) => self.memory.erase(region),
            };
            Ok(Some(match result {
                Ok(()) => Reply::Done,
                Err(_) => Reply::Failed,
            }))
        }
    }
}
