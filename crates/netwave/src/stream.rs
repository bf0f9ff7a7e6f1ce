use glam::{Quat, Vec3};
use thiserror::Error;

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("unexpected end of buffer: requested {requested} bytes, {available} available")]
    UnexpectedEof { requested: usize, available: usize },

    #[error("bad packet magic 0x{found:08X}")]
    BadMagic { found: u32 },

    #[error("packet size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("declared payload size {declared} exceeds {available} available bytes")]
    ShortPayload { declared: usize, available: usize },

    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("property kind {0} cannot be decoded")]
    UnsupportedProperty(u8),
}

/// Append-only little-endian byte writer with capacity growth.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Length-prefixed UTF-8, no terminator.
    pub fn write_str(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Three f32 components in x, y, z order.
    pub fn write_vec3(&mut self, value: Vec3) {
        self.write_f32(value.x);
        self.write_f32(value.y);
        self.write_f32(value.z);
    }

    /// Four f32 components in w, x, y, z order.
    pub fn write_quat(&mut self, value: Quat) {
        self.write_f32(value.w);
        self.write_f32(value.x);
        self.write_f32(value.y);
        self.write_f32(value.z);
    }
}

/// Bounds-checked cursor over a byte slice.
///
/// Every read returns an error instead of panicking when the buffer is
/// exhausted.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn can_read(&self, bytes: usize) -> bool {
        self.remaining() >= bytes
    }

    fn take(&mut self, bytes: usize) -> Result<&'a [u8], WireError> {
        if !self.can_read(bytes) {
            return Err(WireError::UnexpectedEof {
                requested: bytes,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + bytes];
        self.pos += bytes;
        Ok(slice)
    }

    pub fn read_bytes(&mut self, bytes: usize) -> Result<&'a [u8], WireError> {
        self.take(bytes)
    }

    /// Consumes and returns everything left in the buffer.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, WireError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, WireError> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f64(&mut self) -> Result<f64, WireError> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, WireError> {
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        let z = self.read_f32()?;
        Ok(Vec3::new(x, y, z))
    }

    pub fn read_quat(&mut self) -> Result<Quat, WireError> {
        let w = self.read_f32()?;
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        let z = self.read_f32()?;
        Ok(Quat::from_xyzw(x, y, z, w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let mut writer = ByteWriter::new();
        writer.write_bool(true);
        writer.write_u8(0xAB);
        writer.write_i8(-7);
        writer.write_u16(0xBEEF);
        writer.write_i16(-12345);
        writer.write_u32(0xDEADBEEF);
        writer.write_i32(-1);
        writer.write_u64(u64::MAX);
        writer.write_i64(i64::MIN);
        writer.write_f32(3.25);
        writer.write_f64(-0.5);

        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert_eq!(reader.read_i8().unwrap(), -7);
        assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
        assert_eq!(reader.read_i16().unwrap(), -12345);
        assert_eq!(reader.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.read_i32().unwrap(), -1);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert_eq!(reader.read_i64().unwrap(), i64::MIN);
        assert_eq!(reader.read_f32().unwrap(), 3.25);
        assert_eq!(reader.read_f64().unwrap(), -0.5);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_string_roundtrip() {
        let mut writer = ByteWriter::new();
        writer.write_str("hello");
        writer.write_str("");
        writer.write_str("日本語");

        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert_eq!(reader.read_string().unwrap(), "");
        assert_eq!(reader.read_string().unwrap(), "日本語");
    }

    #[test]
    fn test_vec3_quat_roundtrip() {
        let v = Vec3::new(1.0, -2.5, 3.75);
        let q = Quat::from_xyzw(0.1, 0.2, 0.3, 0.9);

        let mut writer = ByteWriter::new();
        writer.write_vec3(v);
        writer.write_quat(q);

        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_vec3().unwrap(), v);
        assert_eq!(reader.read_quat().unwrap(), q);
    }

    #[test]
    fn test_quat_wire_order_is_wxyz() {
        let q = Quat::from_xyzw(2.0, 3.0, 4.0, 1.0);
        let mut writer = ByteWriter::new();
        writer.write_quat(q);

        let bytes = writer.into_bytes();
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2.0f32.to_le_bytes());
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = ByteReader::new(&[1, 2]);
        assert_eq!(reader.read_u8().unwrap(), 1);
        let err = reader.read_u32().unwrap_err();
        assert_eq!(
            err,
            WireError::UnexpectedEof {
                requested: 4,
                available: 1
            }
        );
    }

    #[test]
    fn test_string_length_beyond_buffer() {
        let mut writer = ByteWriter::new();
        writer.write_u32(100);
        writer.write_bytes(b"short");

        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(
            reader.read_string(),
            Err(WireError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_rest_consumes_tail() {
        let mut reader = ByteReader::new(&[1, 2, 3, 4]);
        reader.read_u8().unwrap();
        assert_eq!(reader.rest(), &[2, 3, 4]);
        assert!(reader.is_empty());
        assert_eq!(reader.rest(), &[] as &[u8]);
    }
}
