// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;
use log::debug;

use super::Header;
use crate::{Error, Result, SequenceError};

/// One chunk of a split message, with the header bits that place it
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Chunk<'a> {
    pub data: &'a [u8],
    pub som: bool,
    pub eom: bool,
    pub pkt_seq: u8,
}

/// Splits `message` into chunks of at most `max_chunk` bytes.
///
/// Sequence numbers cycle 0, 1, 2, 3, 0, ... An empty message still
/// produces a single (empty) chunk carrying both SOM and EOM.
pub fn split(message: &[u8], max_chunk: usize) -> Result<Vec<Chunk<'_>>> {
    if max_chunk == 0 {
        return Err(Error::InvalidArgument(
            "Fragment size must be non-zero".to_string(),
        ));
    }

    if message.is_empty() {
        return Ok(alloc::vec![Chunk {
            data: message,
            som: true,
            eom: true,
            pkt_seq: 0,
        }]);
    }

    let count = message.len().div_ceil(max_chunk);
    Ok(message
        .chunks(max_chunk)
        .enumerate()
        .map(|(i, data)| Chunk {
            data,
            som: i == 0,
            eom: i + 1 == count,
            pkt_seq: (i as u8) & ::mctp::MCTP_SEQ_MASK,
        })
        .collect())
}

/// An inbound packet body along with the header fields reassembly needs
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fragment {
    pub src_eid: u8,
    pub msg_tag: u8,
    pub som: bool,
    pub eom: bool,
    pub pkt_seq: u8,
    pub data: Vec<u8>,
}

impl Fragment {
    pub fn new(header: &Header, data: &[u8]) -> Self {
        Self {
            src_eid: header.src_eid,
            msg_tag: header.msg_tag,
            som: header.som,
            eom: header.eom,
            pkt_seq: header.pkt_seq,
            data: data.to_vec(),
        }
    }

    fn key(&self) -> (u8, u8) {
        (self.src_eid, self.msg_tag)
    }
}

#[derive(Debug)]
struct ReassemblyBuffer {
    data: Vec<u8>,
    expected_seq: u8,
}

/// Outcome of accepting a fragment
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reassembly {
    Incomplete,
    Complete(Vec<u8>),
}

/// Joins fragments into messages, tracking one buffer per
/// (source EID, message tag).
///
/// There is no notion of time here: stale buffers linger until a new SOM
/// arrives for the same key or the owner calls [`Reassembler::evict`].
#[derive(Debug, Default)]
pub struct Reassembler {
    buffers: BTreeMap<(u8, u8), ReassemblyBuffer>,
    max_len: Option<usize>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassembled messages longer than `max_len` are dropped with an error
    pub fn with_limit(max_len: usize) -> Self {
        Self {
            buffers: BTreeMap::new(),
            max_len: Some(max_len),
        }
    }

    pub fn accept(&mut self, fragment: Fragment) -> Result<Reassembly> {
        let key = fragment.key();

        if fragment.som {
            if self.buffers.remove(&key).is_some() {
                debug!("Discarding partial message for {key:?} on new SOM");
            }
            self.buffers.insert(
                key,
                ReassemblyBuffer {
                    data: Vec::new(),
                    expected_seq: fragment.pkt_seq,
                },
            );
        }

        let Some(buf) = self.buffers.get_mut(&key) else {
            debug!("Continuation fragment for {key:?} without SOM");
            return Err(SequenceError::NoMessage.into());
        };

        if fragment.pkt_seq != buf.expected_seq {
            let err = SequenceError::Unexpected {
                expected: buf.expected_seq,
                found: fragment.pkt_seq,
            };
            debug!("Dropping message for {key:?}: {err:?}");
            self.buffers.remove(&key);
            return Err(err.into());
        }

        if let Some(max) = self.max_len
            && buf.data.len() + fragment.data.len() > max
        {
            self.buffers.remove(&key);
            return Err(Error::Format(format!(
                "Reassembled message exceeds {max} bytes"
            )));
        }

        buf.data.extend_from_slice(&fragment.data);
        buf.expected_seq = (buf.expected_seq + 1) & ::mctp::MCTP_SEQ_MASK;

        if !fragment.eom {
            return Ok(Reassembly::Incomplete);
        }

        Ok(self
            .buffers
            .remove(&key)
            .map_or(Reassembly::Incomplete, |b| Reassembly::Complete(b.data)))
    }

    /// Drops any partial message for the key, returning whether one existed
    pub fn evict(&mut self, src_eid: u8, msg_tag: u8) -> bool {
        self.buffers.remove(&(src_eid, msg_tag)).is_some()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Number of messages currently partially assembled
    pub fn in_flight(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod test {
    use alloc::vec::Vec;

    use super::{Fragment, Reassembler, Reassembly, split};
    use crate::{Error, SequenceError};

    fn fragments(message: &[u8], max: usize, src_eid: u8, msg_tag: u8) -> Vec<Fragment> {
        split(message, max)
            .unwrap()
            .into_iter()
            .map(|c| Fragment {
                src_eid,
                msg_tag,
                som: c.som,
                eom: c.eom,
                pkt_seq: c.pkt_seq,
                data: c.data.to_vec(),
            })
            .collect()
    }

    #[test]
    fn split_flags_and_sequence() {
        let message: Vec<u8> = (0..10).collect();
        let chunks = split(&message, 2).unwrap();
        assert_eq!(chunks.len(), 5);

        let seqs: Vec<u8> = chunks.iter().map(|c| c.pkt_seq).collect();
        assert_eq!(seqs, [0, 1, 2, 3, 0]);

        assert!(chunks[0].som && !chunks[0].eom);
        assert!(chunks[1..4].iter().all(|c| !c.som && !c.eom));
        assert!(!chunks[4].som && chunks[4].eom);
    }

    #[test]
    fn split_single() {
        let chunks = split(&[1, 2, 3], 3).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].som && chunks[0].eom);
        assert_eq!(chunks[0].data, [1, 2, 3]);

        let chunks = split(&[], 8).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].som && chunks[0].eom);
    }

    #[test]
    fn split_zero_chunk() {
        assert!(matches!(split(&[1], 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn roundtrip() {
        for len in 0..40usize {
            let message: Vec<u8> = (0..len).map(|v| v as u8).collect();
            for max in 1..12 {
                let mut r = Reassembler::new();
                let frags = fragments(&message, max, 1, 3);
                let last = frags.len() - 1;
                for (i, f) in frags.into_iter().enumerate() {
                    let res = r.accept(f).unwrap();
                    if i == last {
                        assert_eq!(res, Reassembly::Complete(message.clone()));
                    } else {
                        assert_eq!(res, Reassembly::Incomplete);
                    }
                }
                assert_eq!(r.in_flight(), 0);
            }
        }
    }

    #[test]
    fn skipped_sequence() {
        let message: Vec<u8> = (0..8).collect();
        let mut frags = fragments(&message, 2, 1, 0);
        let mut r = Reassembler::new();

        assert_eq!(r.accept(frags.remove(0)).unwrap(), Reassembly::Incomplete);
        // Drop seq 1
        frags.remove(0);
        assert_eq!(
            r.accept(frags.remove(0)).unwrap_err(),
            Error::Sequence(SequenceError::Unexpected {
                expected: 1,
                found: 2
            })
        );
        assert_eq!(r.in_flight(), 0);

        // The trailing EOM must not complete anything
        assert_eq!(
            r.accept(frags.remove(0)).unwrap_err(),
            Error::Sequence(SequenceError::NoMessage)
        );
    }

    #[test]
    fn last_som_wins() {
        let mut r = Reassembler::new();
        let stale = fragments(&[9, 9, 9, 9], 2, 4, 1);
        assert_eq!(r.accept(stale[0].clone()).unwrap(), Reassembly::Incomplete);

        let fresh = fragments(&[1, 2, 3], 2, 4, 1);
        assert_eq!(r.accept(fresh[0].clone()).unwrap(), Reassembly::Incomplete);
        assert_eq!(
            r.accept(fresh[1].clone()).unwrap(),
            Reassembly::Complete(alloc::vec![1, 2, 3])
        );
    }

    #[test]
    fn independent_keys() {
        let mut r = Reassembler::new();
        let a = fragments(&[1, 2, 3, 4], 2, 1, 0);
        let b = fragments(&[5, 6, 7, 8], 2, 1, 1);

        assert_eq!(r.accept(a[0].clone()).unwrap(), Reassembly::Incomplete);
        assert_eq!(r.accept(b[0].clone()).unwrap(), Reassembly::Incomplete);
        assert_eq!(r.in_flight(), 2);
        assert_eq!(
            r.accept(b[1].clone()).unwrap(),
            Reassembly::Complete(alloc::vec![5, 6, 7, 8])
        );
        assert_eq!(
            r.accept(a[1].clone()).unwrap(),
            Reassembly::Complete(alloc::vec![1, 2, 3, 4])
        );
    }

    #[test]
    fn evict() {
        let mut r = Reassembler::new();
        let a = fragments(&[1, 2, 3, 4], 2, 7, 2);
        r.accept(a[0].clone()).unwrap();
        assert!(r.evict(7, 2));
        assert!(!r.evict(7, 2));
        assert!(r.accept(a[1].clone()).is_err());
    }

    #[test]
    fn limit() {
        let mut r = Reassembler::with_limit(3);
        let a = fragments(&[1, 2, 3, 4], 2, 7, 2);
        r.accept(a[0].clone()).unwrap();
        assert!(matches!(r.accept(a[1].clone()), Err(Error::Format(_))));
        assert_eq!(r.in_flight(), 0);
    }
}
