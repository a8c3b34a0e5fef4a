// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Fakes for the parts of an update `suit_dfu` leaves to the integration: a
//! manifest interpreter and the secure domain's install entry point.
//!
//! The interpreter does not speak SUIT. Its "envelopes" are a short header
//! followed by JSON, which is enough to drive every call a real interpreter
//! makes into a [`Platform`].

use std::cell::RefCell;

use serde::Deserialize;
use serde::Serialize;

use suit_dfu::cbor;
use suit_dfu::component::ComponentId;
use suit_dfu::component::Uuid;
use suit_dfu::crypto::sig;
use suit_dfu::execution_mode::ExecutionMode;
use suit_dfu::hardware::flash::Flash;
use suit_dfu::hardware::flash::Region;
use suit_dfu::orchestrator::Error;
use suit_dfu::orchestrator::InstallTrigger;
use suit_dfu::orchestrator::Installation;
use suit_dfu::orchestrator::Processor;
use suit_dfu::orchestrator::UpdateRequest;
use suit_dfu::platform::Platform;
use suit_dfu::platform::Sequence;
use suit_dfu::sink::StreamSink as _;
use suit_dfu::status::ErrorKind;

/// The CBOR tag every envelope starts with.
pub const ENVELOPE_TAG: [u8; 2] = [0xd8, 0x6b];

/// The length of the envelope header: the tag and a big-endian body length.
pub const HEADER_LEN: usize = 6;

/// The COSE identifier of SHA-256.
pub const SHA256: i32 = -16;

/// The chunk size payloads are streamed in.
const CHUNK: usize = 64;

/// A command in a [`Manifest`] sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Step {
    /// Streams `payload` into cache partition `pool` under `uri`, checking
    /// it against the SHA-256 `digest` along the way.
    Fetch {
        pool: u32,
        uri: String,
        payload: Vec<u8>,
        digest: Vec<u8>,
    },
    /// Writes `payload` to the component with the encoded ID `component`.
    Write { component: Vec<u8>, payload: Vec<u8> },
    /// Starts processing the dependency of class `child`.
    Dependency { child: Uuid },
    /// Gives up with the given error.
    Fail(ErrorKind),
}

/// A manifest, as understood by [`Script`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// The manifest's class.
    pub class_id: Uuid,
    /// The command sequences present in the manifest.
    pub sequences: Vec<(Sequence, Vec<Step>)>,
}

/// A signature over a [`Manifest`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Signature {
    /// The COSE signature algorithm.
    pub alg: i32,
    /// The signing key.
    pub key_id: u32,
    /// The signature itself.
    pub bytes: Vec<u8>,
}

/// An envelope: a manifest and, optionally, its signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// The serialized manifest.
    pub manifest: Vec<u8>,
    /// The signature over `manifest`.
    pub signature: Option<Signature>,
}

impl Envelope {
    /// Wraps `manifest`, signing it with `signer` if one is given.
    pub fn new(
        manifest: &Manifest,
        signer: Option<(u32, &mut dyn sig::Sign, i32)>,
    ) -> Self {
        let manifest = serde_json::to_vec(manifest).unwrap();
        let signature = signer.map(|(key_id, signer, alg)| {
            let mut bytes = vec![0; signer.sig_bytes()];
            signer.sign(&manifest, &mut bytes).unwrap();
            Signature { alg, key_id, bytes }
        });
        Self {
            manifest,
            signature,
        }
    }

    /// Serializes this envelope into the bytes stored in the DFU partition.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = serde_json::to_vec(self).unwrap();
        let mut bytes = ENVELOPE_TAG.to_vec();
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);
        bytes
    }
}

/// Encodes a component ID.
pub fn encode_id(id: ComponentId) -> Vec<u8> {
    let mut buf = [0; suit_dfu::component::MAX_ENCODED_LEN];
    id.encode(&mut buf).unwrap().to_vec()
}

/// A manifest interpreter running the [`Step`]s of envelopes stored in
/// MRAM.
pub struct Script<'a> {
    mram: &'a RefCell<dyn Flash + 'a>,
    /// The sequences run so far, in order.
    pub log: Vec<Sequence>,
}

impl<'a> Script<'a> {
    /// Creates a new `Script` reading envelopes out of `mram`.
    pub fn new(mram: &'a RefCell<dyn Flash + 'a>) -> Self {
        Self {
            mram,
            log: Vec::new(),
        }
    }

    fn read(&self, region: Region) -> Result<Vec<u8>, Error> {
        let mram = self.mram.borrow();
        let offset = mram
            .capabilities()?
            .offset_of(region.ptr.address)
            .ok_or(Error::BadEnvelope)?;
        let mut buf = vec![0; region.len as usize];
        mram.read(offset, &mut buf)?;
        Ok(buf)
    }

    fn load(&self, envelope: Region) -> Result<Envelope, Error> {
        let bytes = self.read(envelope)?;
        serde_json::from_slice(&bytes[HEADER_LEN..])
            .map_err(|_| Error::BadEnvelope)
    }
}

impl Processor for Script<'_> {
    fn envelope_len(&mut self, dfu: Region) -> Result<u32, Error> {
        let header = self.read(Region::new(dfu.ptr.address, HEADER_LEN as u32))?;
        if header[..2] != ENVELOPE_TAG {
            return Err(Error::BadEnvelope);
        }
        let mut len = [0; 4];
        len.copy_from_slice(&header[2..]);
        u32::from_be_bytes(len)
            .checked_add(HEADER_LEN as u32)
            .ok_or(Error::BadEnvelope)
    }

    fn run(
        &mut self,
        platform: &mut Platform<'_, '_>,
        envelope: Region,
        sequence: Sequence,
        mode: &ExecutionMode,
    ) -> Result<(), Error> {
        self.log.push(sequence);
        let envelope = self.load(envelope)?;
        let manifest: Manifest = serde_json::from_slice(&envelope.manifest)
            .map_err(|_| Error::BadEnvelope)?;
        let manifest_id = encode_id(ComponentId::InstalledManifest(manifest.class_id));

        let (alg, key_id, signature) = match &envelope.signature {
            Some(sig) => (sig.alg, sig.key_id, &sig.bytes[..]),
            None => (-7, 0, &[][..]),
        };
        let mut kid = [0; 8];
        let mut encoder = cbor::Encoder::new(&mut kid);
        encoder
            .int(cbor::Int::from_u32(key_id))
            .map_err(|_| Error::BadEnvelope)?;
        platform
            .authenticate_manifest(
                &manifest_id,
                alg,
                encoder.finish(),
                signature,
                &envelope.manifest,
                mode,
            )
            .map_err(Error::sequence)?;

        let steps = manifest
            .sequences
            .iter()
            .find(|(s, _)| *s == sequence)
            .map(|(_, steps)| steps)
            .ok_or(Error::SequenceUnavailable)?;
        for step in steps {
            run_step(platform, &manifest_id, step, sequence, mode)?;
        }
        Ok(())
    }
}

fn run_step(
    platform: &mut Platform<'_, '_>,
    manifest_id: &[u8],
    step: &Step,
    sequence: Sequence,
    mode: &ExecutionMode,
) -> Result<(), Error> {
    match step {
        Step::Fetch {
            pool,
            uri,
            payload,
            digest,
        } => {
            let id = encode_id(ComponentId::CachePool(*pool));
            platform
                .authorize_component_id(manifest_id, &id)
                .map_err(Error::sequence)?;
            let mut sink = platform
                .sink_select(&id, Some(uri.as_bytes()))
                .map_err(Error::sequence)?;
            let mut hash = platform
                .digest_sink(SHA256, digest, Some(payload.len() as u32))
                .map_err(Error::sequence)?;
            for chunk in payload.chunks(CHUNK) {
                hash.write(chunk).map_err(Error::sequence)?;
                sink.write(chunk).map_err(Error::sequence)?;
            }
            hash.check().map_err(Error::sequence)?;
            hash.release().map_err(Error::sequence)?;
            if let Some(cache) = sink.as_cache() {
                cache.commit().map_err(Error::sequence)?;
            }
            sink.release().map_err(Error::sequence)
        }
        Step::Write { component, payload } => {
            platform
                .authorize_component_id(manifest_id, component)
                .map_err(Error::sequence)?;
            let mut sink = platform
                .sink_select(component, None)
                .map_err(Error::sequence)?;
            for chunk in payload.chunks(CHUNK) {
                sink.write(chunk).map_err(Error::sequence)?;
            }
            sink.release().map_err(Error::sequence)
        }
        Step::Dependency { child } => {
            let child = encode_id(ComponentId::InstalledManifest(*child));
            platform
                .authorize_process_dependency(manifest_id, &child, sequence, mode)
                .map_err(Error::sequence)
        }
        Step::Fail(kind) => Err(Error::Sequence(*kind)),
    }
}

/// A fake secure domain, which records every request it receives.
pub struct Trigger {
    /// What to answer requests with.
    pub answer: Result<Installation, Error>,
    /// The requests received so far.
    pub requests: Vec<UpdateRequest>,
}

impl Trigger {
    /// Creates a new `Trigger` which answers with `answer`.
    pub fn new(answer: Result<Installation, Error>) -> Self {
        Self {
            answer,
            requests: Vec::new(),
        }
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new(Ok(Installation::Scheduled))
    }
}

impl InstallTrigger for Trigger {
    fn trigger(&mut self, request: &UpdateRequest) -> Result<Installation, Error> {
        self.requests.push(*request);
        self.answer
    }
}
