// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2025 Adrian <adrian.eddy at gmail>

use std::collections::VecDeque;

/// Encoder output waiting to be handed to the caller. Timestamps are source timestamps in microseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingArtifact {
    Frame {
        data: Vec<u8>,
        dts: u64,
        pts: u64,
        keyframe: bool,
        quantizer: u32,
    },
    /// First pass placeholder. The stats themselves went to the stats file.
    Stats { dts: u64, pts: u64 },
}

impl PendingArtifact {
    pub fn dts(&self) -> u64 {
        match self {
            PendingArtifact::Frame { dts, .. } | PendingArtifact::Stats { dts, .. } => *dts,
        }
    }
    pub fn pts(&self) -> u64 {
        match self {
            PendingArtifact::Frame { pts, .. } | PendingArtifact::Stats { pts, .. } => *pts,
        }
    }
}

/// FIFO between the codec, which may return any number of packets per submission, and the caller,
/// which takes one per call.
#[derive(Debug, Default)]
pub struct OutputQueue {
    pending: VecDeque<PendingArtifact>,
}

impl OutputQueue {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, artifact: PendingArtifact) { self.pending.push_back(artifact); }
    pub fn pop(&mut self) -> Option<PendingArtifact> { self.pending.pop_front() }

    pub fn len(&self) -> usize { self.pending.len() }
    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    /// Drops everything still queued, returns how many artifacts were lost.
    pub fn discard(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

/// Output record handed to the muxer. The payload buffer is sized once by the caller.
#[derive(Debug, Clone)]
pub struct OutputPacket {
    data: Vec<u8>,
    capacity: usize,
    pub dts: u64,
    pub pts: u64,
    pub keyframe: bool,
    pub quantizer: u32,
}

impl OutputPacket {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            dts: 0,
            pts: 0,
            keyframe: false,
            quantizer: 0,
        }
    }

    /// Payload, empty for first pass placeholders
    pub fn data(&self) -> &[u8] { &self.data }
    pub fn capacity(&self) -> usize { self.capacity }

    /// Takes over a dequeued artifact. Placeholders only set the timestamps.
    ///
    /// Panics if a frame payload does not fit into the capacity given at construction.
    pub fn fill(&mut self, artifact: PendingArtifact) {
        self.data.clear();
        self.keyframe = false;
        match artifact {
            PendingArtifact::Stats { dts, pts } => {
                self.dts = dts;
                self.pts = pts;
            }
            PendingArtifact::Frame { data, dts, pts, keyframe, quantizer } => {
                assert!(data.len() <= self.capacity, "encoded frame of {} bytes does not fit the {} byte output buffer", data.len(), self.capacity);
                self.data.extend_from_slice(&data);
                self.dts = dts;
                self.pts = pts;
                self.keyframe = keyframe;
                self.quantizer = quantizer;
            }
        }
    }
}
