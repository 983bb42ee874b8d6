//! Response body material.
//!
//! One zero-filled chunk is allocated per request and handed out
//! repeatedly; the final chunk is a slice of it. Producing 900 MB therefore
//! costs one chunk of memory, not 900 MB.

use std::collections::TryReserveError;

use axum::body::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("chunk size must be greater than zero")]
    EmptyChunk,

    #[error("cannot allocate {bytes} byte chunk: {source}")]
    Alloc {
        bytes: usize,
        #[source]
        source: TryReserveError,
    },
}

/// A payload of `total` bytes emitted in chunks.
#[derive(Debug, Clone)]
pub struct PayloadPlan {
    total: u64,
    chunk: Bytes,
}

impl PayloadPlan {
    /// Allocate the chunk buffer for a payload of `total` bytes.
    pub fn build(total: u64, chunk_bytes: usize) -> Result<Self, PayloadError> {
        if chunk_bytes == 0 {
            return Err(PayloadError::EmptyChunk);
        }

        let len = usize::try_from(total).unwrap_or(usize::MAX).min(chunk_bytes);
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|source| PayloadError::Alloc { bytes: len, source })?;
        buf.resize(len, 0);

        Ok(Self {
            total,
            chunk: Bytes::from(buf),
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Iterate over the chunks that make up the payload.
    pub fn chunks(&self) -> Chunks {
        Chunks {
            chunk: self.chunk.clone(),
            remaining: self.total,
        }
    }
}

/// Iterator over payload chunks.
#[derive(Debug)]
pub struct Chunks {
    chunk: Bytes,
    remaining: u64,
}

impl Chunks {
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Iterator for Chunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.remaining == 0 || self.chunk.is_empty() {
            return None;
        }
        let len = (self.chunk.len() as u64).min(self.remaining) as usize;
        self.remaining -= len as u64;
        Some(self.chunk.slice(..len))
    }
}
