//! Per-entity replication primitive.
//!
//! The owner of an entity writes an ordered sequence of primitive values;
//! every other holder reads the same sequence in the same order. Field
//! order is the contract: each value carries a one-byte type tag so a
//! skewed call site fails with a loud error instead of silently
//! desynchronizing fields.

use serde::{Deserialize, Serialize};

use crate::util::vec3::{Quat, Vec3};

/// Delivery scope for a discrete action call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// All participants, including the sender
    Everyone,
    /// Only the session authority
    AuthorityOnly,
    /// One specific participant (human connection id)
    Actor(i32),
}

/// Errors raised while reading a snapshot stream.
///
/// Any of these on a replica means the producer and consumer disagree on
/// the field sequence for this entity type - a fatal local desync.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot type mismatch at offset {offset}: expected {expected}, found tag {found}")]
    TypeMismatch {
        expected: &'static str,
        found: u8,
        offset: usize,
    },
    #[error("snapshot ended early at offset {0}")]
    UnexpectedEnd(usize),
    #[error("snapshot has {0} trailing bytes after the final field")]
    TrailingBytes(usize),
    #[error("snapshot string field is not valid utf-8")]
    InvalidString,
    #[error("snapshot list length {0} exceeds the {MAX_LIST_LEN} element limit")]
    OversizedList(usize),
}

/// Upper bound on replicated list fields (attachments, customization)
pub const MAX_LIST_LEN: usize = 1024;

const TAG_BOOL: u8 = 0x01;
const TAG_U8: u8 = 0x02;
const TAG_I32: u8 = 0x03;
const TAG_U32: u8 = 0x04;
const TAG_U64: u8 = 0x05;
const TAG_F32: u8 = 0x06;
const TAG_STR: u8 = 0x07;
const TAG_VEC3: u8 = 0x08;
const TAG_QUAT: u8 = 0x09;
const TAG_I32_LIST: u8 = 0x0A;

fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_BOOL => "bool",
        TAG_U8 => "u8",
        TAG_I32 => "i32",
        TAG_U32 => "u32",
        TAG_U64 => "u64",
        TAG_F32 => "f32",
        TAG_STR => "str",
        TAG_VEC3 => "vec3",
        TAG_QUAT => "quat",
        TAG_I32_LIST => "i32 list",
        _ => "unknown",
    }
}

/// Implemented by every replicated entity type.
///
/// `write_snapshot` and `read_snapshot` must emit/consume the exact same
/// field sequence; the round-trip tests in each implementor hold that
/// contract.
pub trait Replicate {
    fn write_snapshot(&self, w: &mut SnapshotWriter);
    fn read_snapshot(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError>;
}

/// Owner-side ordered field stream
#[derive(Debug, Default)]
pub struct SnapshotWriter {
    buf: Vec<u8>,
}

impl SnapshotWriter {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(128) }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(TAG_BOOL);
        self.buf.push(u8::from(v));
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(TAG_U8);
        self.buf.push(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.push(TAG_I32);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.push(TAG_U32);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.push(TAG_U64);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.push(TAG_F32);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_str(&mut self, v: &str) {
        self.buf.push(TAG_STR);
        self.buf
            .extend_from_slice(&(v.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(v.as_bytes());
    }

    pub fn put_vec3(&mut self, v: Vec3) {
        self.buf.push(TAG_VEC3);
        self.buf.extend_from_slice(&v.x.to_le_bytes());
        self.buf.extend_from_slice(&v.y.to_le_bytes());
        self.buf.extend_from_slice(&v.z.to_le_bytes());
    }

    pub fn put_quat(&mut self, q: Quat) {
        self.buf.push(TAG_QUAT);
        self.buf.extend_from_slice(&q.x.to_le_bytes());
        self.buf.extend_from_slice(&q.y.to_le_bytes());
        self.buf.extend_from_slice(&q.z.to_le_bytes());
        self.buf.extend_from_slice(&q.w.to_le_bytes());
    }

    pub fn put_i32_list(&mut self, list: &[i32]) {
        debug_assert!(list.len() <= MAX_LIST_LEN);
        self.buf.push(TAG_I32_LIST);
        self.buf
            .extend_from_slice(&(list.len() as u32).to_le_bytes());
        for v in list {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }
}

/// Consumer-side ordered field stream
#[derive(Debug)]
pub struct SnapshotReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reject snapshots with unread fields - the producer wrote more than
    /// the consumer knows how to read.
    pub fn finish(self) -> Result<(), SnapshotError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(SnapshotError::TrailingBytes(self.buf.len() - self.pos))
        }
    }

    fn expect_tag(&mut self, expected: u8) -> Result<(), SnapshotError> {
        let Some(&found) = self.buf.get(self.pos) else {
            return Err(SnapshotError::UnexpectedEnd(self.pos));
        };
        if found != expected {
            return Err(SnapshotError::TypeMismatch {
                expected: tag_name(expected),
                found,
                offset: self.pos,
            });
        }
        self.pos += 1;
        Ok(())
    }

    fn take_bytes<const N: usize>(&mut self) -> Result<[u8; N], SnapshotError> {
        let end = self.pos + N;
        if end > self.buf.len() {
            return Err(SnapshotError::UnexpectedEnd(self.pos));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(out)
    }

    pub fn take_bool(&mut self) -> Result<bool, SnapshotError> {
        self.expect_tag(TAG_BOOL)?;
        Ok(self.take_bytes::<1>()?[0] != 0)
    }

    pub fn take_u8(&mut self) -> Result<u8, SnapshotError> {
        self.expect_tag(TAG_U8)?;
        Ok(self.take_bytes::<1>()?[0])
    }

    pub fn take_i32(&mut self) -> Result<i32, SnapshotError> {
        self.expect_tag(TAG_I32)?;
        Ok(i32::from_le_bytes(self.take_bytes::<4>()?))
    }

    pub fn take_u32(&mut self) -> Result<u32, SnapshotError> {
        self.expect_tag(TAG_U32)?;
        Ok(u32::from_le_bytes(self.take_bytes::<4>()?))
    }

    pub fn take_u64(&mut self) -> Result<u64, SnapshotError> {
        self.expect_tag(TAG_U64)?;
        Ok(u64::from_le_bytes(self.take_bytes::<8>()?))
    }

    pub fn take_f32(&mut self) -> Result<f32, SnapshotError> {
        self.expect_tag(TAG_F32)?;
        Ok(f32::from_le_bytes(self.take_bytes::<4>()?))
    }

    pub fn take_str(&mut self) -> Result<String, SnapshotError> {
        self.expect_tag(TAG_STR)?;
        let len = u32::from_le_bytes(self.take_bytes::<4>()?) as usize;
        if len > MAX_LIST_LEN * 4 {
            return Err(SnapshotError::OversizedList(len));
        }
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(SnapshotError::UnexpectedEnd(self.pos));
        }
        let s = std::str::from_utf8(&self.buf[self.pos..end])
            .map_err(|_| SnapshotError::InvalidString)?
            .to_string();
        self.pos = end;
        Ok(s)
    }

    pub fn take_vec3(&mut self) -> Result<Vec3, SnapshotError> {
        self.expect_tag(TAG_VEC3)?;
        Ok(Vec3::new(
            f32::from_le_bytes(self.take_bytes::<4>()?),
            f32::from_le_bytes(self.take_bytes::<4>()?),
            f32::from_le_bytes(self.take_bytes::<4>()?),
        ))
    }

    pub fn take_quat(&mut self) -> Result<Quat, SnapshotError> {
        self.expect_tag(TAG_QUAT)?;
        Ok(Quat::new(
            f32::from_le_bytes(self.take_bytes::<4>()?),
            f32::from_le_bytes(self.take_bytes::<4>()?),
            f32::from_le_bytes(self.take_bytes::<4>()?),
            f32::from_le_bytes(self.take_bytes::<4>()?),
        ))
    }

    pub fn take_i32_list(&mut self) -> Result<Vec<i32>, SnapshotError> {
        self.expect_tag(TAG_I32_LIST)?;
        let len = u32::from_le_bytes(self.take_bytes::<4>()?) as usize;
        if len > MAX_LIST_LEN {
            return Err(SnapshotError::OversizedList(len));
        }
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(i32::from_le_bytes(self.take_bytes::<4>()?));
        }
        Ok(out)
    }
}

/// Serialize a full snapshot for one replicated value
pub fn emit_snapshot<T: Replicate>(value: &T) -> Vec<u8> {
    let mut w = SnapshotWriter::new();
    value.write_snapshot(&mut w);
    w.into_bytes()
}

/// Apply a snapshot all-or-nothing: the value is only updated if the
/// entire stream reads back cleanly, so a mismatched stream can never
/// leave a half-applied field set behind.
pub fn apply_snapshot<T: Replicate + Clone>(value: &mut T, bytes: &[u8]) -> Result<(), SnapshotError> {
    let mut scratch = value.clone();
    let mut r = SnapshotReader::new(bytes);
    scratch.read_snapshot(&mut r)?;
    r.finish()?;
    *value = scratch;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_roundtrip() {
        let mut w = SnapshotWriter::new();
        w.put_bool(true);
        w.put_u8(7);
        w.put_i32(-42);
        w.put_u32(99);
        w.put_u64(1 << 40);
        w.put_f32(3.25);
        w.put_str("Recruit");
        w.put_vec3(Vec3::new(1.0, -2.0, 3.0));
        w.put_quat(Quat::from_yaw(0.5));
        w.put_i32_list(&[4, 5, 6]);

        let bytes = w.into_bytes();
        let mut r = SnapshotReader::new(&bytes);
        assert!(r.take_bool().unwrap());
        assert_eq!(r.take_u8().unwrap(), 7);
        assert_eq!(r.take_i32().unwrap(), -42);
        assert_eq!(r.take_u32().unwrap(), 99);
        assert_eq!(r.take_u64().unwrap(), 1 << 40);
        assert_eq!(r.take_f32().unwrap(), 3.25);
        assert_eq!(r.take_str().unwrap(), "Recruit");
        assert_eq!(r.take_vec3().unwrap(), Vec3::new(1.0, -2.0, 3.0));
        assert_eq!(r.take_quat().unwrap(), Quat::from_yaw(0.5));
        assert_eq!(r.take_i32_list().unwrap(), vec![4, 5, 6]);
        r.finish().unwrap();
    }

    #[test]
    fn test_out_of_order_read_fails() {
        let mut w = SnapshotWriter::new();
        w.put_i32(1);
        w.put_f32(2.0);

        let bytes = w.into_bytes();
        let mut r = SnapshotReader::new(&bytes);
        // Reading f32 where i32 was written must fail loudly
        let err = r.take_f32().unwrap_err();
        assert!(matches!(err, SnapshotError::TypeMismatch { expected: "f32", .. }));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut w = SnapshotWriter::new();
        w.put_i32(1);
        w.put_i32(2);

        let bytes = w.into_bytes();
        let mut r = SnapshotReader::new(&bytes);
        r.take_i32().unwrap();
        // Consumer read fewer fields than the producer wrote
        assert!(matches!(r.finish(), Err(SnapshotError::TrailingBytes(_))));
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let mut w = SnapshotWriter::new();
        w.put_u64(12345);
        let mut bytes = w.into_bytes();
        bytes.truncate(bytes.len() - 2);

        let mut r = SnapshotReader::new(&bytes);
        assert!(matches!(r.take_u64(), Err(SnapshotError::UnexpectedEnd(_))));
    }

    #[test]
    fn test_oversized_list_rejected() {
        let mut bytes = vec![0x0A]; // i32 list tag
        bytes.extend_from_slice(&(MAX_LIST_LEN as u32 + 1).to_le_bytes());
        let mut r = SnapshotReader::new(&bytes);
        assert!(matches!(r.take_i32_list(), Err(SnapshotError::OversizedList(_))));
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Probe {
        a: i32,
        b: f32,
    }

    impl Replicate for Probe {
        fn write_snapshot(&self, w: &mut SnapshotWriter) {
            w.put_i32(self.a);
            w.put_f32(self.b);
        }

        fn read_snapshot(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
            self.a = r.take_i32()?;
            self.b = r.take_f32()?;
            Ok(())
        }
    }

    #[test]
    fn test_apply_snapshot_roundtrip() {
        let src = Probe { a: 9, b: -1.5 };
        let mut dst = Probe { a: 0, b: 0.0 };
        apply_snapshot(&mut dst, &emit_snapshot(&src)).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_apply_snapshot_is_all_or_nothing() {
        let src = Probe { a: 9, b: -1.5 };
        let mut bytes = emit_snapshot(&src);
        bytes.push(0xFF); // trailing garbage

        let original = Probe { a: 1, b: 2.0 };
        let mut dst = original.clone();
        assert!(apply_snapshot(&mut dst, &bytes).is_err());
        // No partial application
        assert_eq!(dst, original);
    }
}
