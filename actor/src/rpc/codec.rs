// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Envelope codec
//!
//! Wire format, all integers little endian:
//!
//! ```text
//! MAGIC | meta_len: u32 | body_len: u32 | meta | body
//! meta = name_len: u8 | name | fields
//! ```
//!
//! `fields` is the bincode encoding of the metadata message named by `name`. The decoder looks
//! the name up in a registry built when the codec is created, where every built-in
//! [`WireMessage`] registers its own decoder.
//!

use crate::{
    Error,
    rpc::message::{
        Envelope, Metadata, NotifyActorSessionAborted, NotifyNewActorMessage,
        NotifyNewActorSession, RequestHeartBeat, ResponseHeartBeat, RpcRequest,
        RpcResponse, WireMessage,
    },
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use std::{collections::HashMap, sync::Arc};

/// Default frame marker.
pub const DEFAULT_MAGIC: &[u8] = b"RUSH";

/// Default upper bound of a whole frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

type DecodeFn = fn(&[u8]) -> Result<Metadata, Error>;

fn decode_fields<M: WireMessage>(fields: &[u8]) -> Result<Metadata, Error> {
    bincode::deserialize::<M>(fields)
        .map(Into::into)
        .map_err(|e| Error::Protocol(format!("bad {} fields: {}", M::NAME, e)))
}

/// Name to decoder table.
#[derive(Default)]
struct Registry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl Registry {
    fn register<M: WireMessage>(&mut self) {
        self.decoders.insert(M::NAME, decode_fields::<M>);
    }

    fn builtin() -> Self {
        let mut registry = Registry::default();
        registry.register::<RpcRequest>();
        registry.register::<RpcResponse>();
        registry.register::<RequestHeartBeat>();
        registry.register::<ResponseHeartBeat>();
        registry.register::<NotifyNewActorSession>();
        registry.register::<NotifyActorSessionAborted>();
        registry.register::<NotifyNewActorMessage>();
        registry
    }
}

/// Length framed envelope codec.
#[derive(Clone)]
pub struct EnvelopeCodec {
    magic: Bytes,
    max_frame_size: usize,
    registry: Arc<Registry>,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAGIC, DEFAULT_MAX_FRAME_SIZE)
    }
}

impl EnvelopeCodec {
    /// Creates a codec using `magic` as frame marker.
    pub fn new(magic: &[u8], max_frame_size: usize) -> Self {
        Self {
            magic: Bytes::copy_from_slice(magic),
            max_frame_size,
            registry: Arc::new(Registry::builtin()),
        }
    }

    fn header_len(&self) -> usize {
        self.magic.len() + 8
    }

    /// True if a decoder is registered for `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.decoders.contains_key(name)
    }

    /// Encodes one envelope into a standalone frame.
    pub fn encode_frame(&self, envelope: &Envelope) -> Result<Bytes, Error> {
        let name = envelope.meta.name();
        if name.len() > u8::MAX as usize {
            return Err(Error::Codec(format!("type name {} is too long", name)));
        }
        let fields = envelope.meta.encode_fields()?;
        let meta_len = 1 + name.len() + fields.len();
        let frame_len = self.header_len() + meta_len + envelope.body.len();
        if frame_len > self.max_frame_size {
            return Err(Error::Codec(format!(
                "frame of {} bytes exceeds the limit of {}",
                frame_len, self.max_frame_size
            )));
        }

        let mut frame = BytesMut::with_capacity(frame_len);
        frame.put_slice(&self.magic);
        frame.put_u32_le(meta_len as u32);
        frame.put_u32_le(envelope.body.len() as u32);
        frame.put_u8(name.len() as u8);
        frame.put_slice(name.as_bytes());
        frame.put_slice(&fields);
        frame.put_slice(&envelope.body);
        Ok(frame.freeze())
    }

    /// Decodes one envelope from the front of `src`.
    ///
    /// Returns `Ok(None)` without consuming anything while the frame is incomplete.
    pub fn decode_frame(
        &self,
        src: &mut BytesMut,
    ) -> Result<Option<Envelope>, Error> {
        let magic_len = self.magic.len();
        let checked = src.len().min(magic_len);
        if src[..checked] != self.magic[..checked] {
            return Err(Error::Protocol("magic marker mismatch".to_owned()));
        }
        let header_len = self.header_len();
        if src.len() < header_len {
            return Ok(None);
        }

        let mut header = &src[magic_len..header_len];
        let meta_len = header.get_u32_le() as usize;
        let body_len = header.get_u32_le() as usize;
        let frame_len = header_len + meta_len + body_len;
        if frame_len > self.max_frame_size {
            return Err(Error::Protocol(format!(
                "frame of {} bytes exceeds the limit of {}",
                frame_len, self.max_frame_size
            )));
        }
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(header_len);
        let meta = frame.split_to(meta_len);
        let meta = self.decode_meta(&meta)?;
        Ok(Some(Envelope {
            meta,
            body: frame.to_vec(),
        }))
    }

    fn decode_meta(&self, meta: &[u8]) -> Result<Metadata, Error> {
        let (name_len, rest) = meta
            .split_first()
            .ok_or_else(|| Error::Protocol("empty metadata".to_owned()))?;
        let name_len = *name_len as usize;
        if rest.len() < name_len {
            return Err(Error::Protocol("truncated type name".to_owned()));
        }
        let (name, fields) = rest.split_at(name_len);
        let name = std::str::from_utf8(name)
            .map_err(|e| Error::Protocol(format!("invalid type name: {}", e)))?;
        let decode = self.registry.decoders.get(name).ok_or_else(|| {
            Error::Protocol(format!("unknown message type {}", name))
        })?;
        decode(fields)
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = Error;

    fn encode(
        &mut self,
        item: Envelope,
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        let frame = self.encode_frame(&item)?;
        dst.extend_from_slice(&frame);
        Ok(())
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = Error;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_frame(src)
    }
}
