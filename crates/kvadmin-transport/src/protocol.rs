//! Frame format for the kvadmin RPC protocol.
//!
//! Every message is a fixed 24-byte header followed by the payload:
//!
//! ```text
//! magic:4 | version:1 | flags:1 | opcode:2 | request_id:8 | payload_length:4 | checksum:4
//! ```
//!
//! All integers are big-endian. The checksum is CRC32 over the payload.

use crate::error::{Result, TransportError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 24;

/// Protocol magic number for frame validation ("KVAD").
pub const MAGIC: u32 = 0x4B56_4144;

/// Protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest payload accepted from the wire (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Operations carried by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    /// Execute a named remote command on the receiving server.
    RemoteCommand = 0x0A01,
    /// Ask a meta server for the current node membership of a role.
    ListNodes = 0x0A02,
}

impl TryFrom<u16> for Opcode {
    type Error = TransportError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0x0A01 => Ok(Opcode::RemoteCommand),
            0x0A02 => Ok(Opcode::ListNodes),
            other => Err(TransportError::UnknownOpcode(other)),
        }
    }
}

/// Frame flags for protocol control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags {
    /// Frame is a response to the request with the same id.
    pub response: bool,
    /// Response payload is a UTF-8 error message instead of a reply.
    pub error: bool,
    /// One-way message (no response expected).
    pub one_way: bool,
}

impl FrameFlags {
    /// Create empty flags
    pub fn empty() -> Self {
        Self::default()
    }

    /// Flags for a response frame.
    pub fn response() -> Self {
        Self {
            response: true,
            ..Self::default()
        }
    }

    /// Convert to raw byte representation
    pub fn as_u8(&self) -> u8 {
        let mut b = 0u8;
        if self.response {
            b |= 0x01;
        }
        if self.error {
            b |= 0x02;
        }
        if self.one_way {
            b |= 0x04;
        }
        b
    }

    /// Create from raw byte representation
    pub fn from_u8(b: u8) -> Self {
        Self {
            response: (b & 0x01) != 0,
            error: (b & 0x02) != 0,
            one_way: (b & 0x04) != 0,
        }
    }
}

/// Frame header containing metadata about the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol magic number
    pub magic: u32,
    /// Protocol version
    pub version: u8,
    /// Control flags
    pub flags: FrameFlags,
    /// Operation code
    pub opcode: Opcode,
    /// Request ID for multiplexing
    pub request_id: u64,
    /// Payload length in bytes
    pub payload_length: u32,
    /// CRC32 checksum of payload
    pub checksum: u32,
}

impl FrameHeader {
    /// Create a new frame header with a zero checksum.
    pub fn new(opcode: Opcode, request_id: u64, payload_length: u32, flags: FrameFlags) -> Self {
        Self {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            flags,
            opcode,
            request_id,
            payload_length,
            checksum: 0,
        }
    }

    /// Serialize the header into its wire form.
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4] = self.version;
        buf[5] = self.flags.as_u8();
        buf[6..8].copy_from_slice(&(self.opcode as u16).to_be_bytes());
        buf[8..16].copy_from_slice(&self.request_id.to_be_bytes());
        buf[16..20].copy_from_slice(&self.payload_length.to_be_bytes());
        buf[20..24].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }

    /// Parse a header, checking magic and version.
    pub fn decode(buf: &[u8; FRAME_HEADER_SIZE]) -> Result<Self> {
        let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != MAGIC {
            return Err(TransportError::InvalidMagic {
                expected: MAGIC,
                got: magic,
            });
        }
        let version = buf[4];
        if version != PROTOCOL_VERSION {
            return Err(TransportError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: version,
            });
        }
        let opcode = Opcode::try_from(u16::from_be_bytes([buf[6], buf[7]]))?;
        let mut request_id = [0u8; 8];
        request_id.copy_from_slice(&buf[8..16]);
        Ok(Self {
            magic,
            version,
            flags: FrameFlags::from_u8(buf[5]),
            opcode,
            request_id: u64::from_be_bytes(request_id),
            payload_length: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
            checksum: u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]),
        })
    }

    fn check_payload_length(&self) -> Result<()> {
        if self.payload_length > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: self.payload_length,
                max_size: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(())
    }
}

/// A single frame in the RPC protocol
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Payload data
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a request frame; the checksum is computed from `payload`.
    pub fn new(opcode: Opcode, request_id: u64, payload: Vec<u8>) -> Self {
        Self::with_flags(opcode, request_id, payload, FrameFlags::empty())
    }

    /// Create a frame with explicit flags.
    pub fn with_flags(opcode: Opcode, request_id: u64, payload: Vec<u8>, flags: FrameFlags) -> Self {
        let mut header = FrameHeader::new(opcode, request_id, payload.len() as u32, flags);
        header.checksum = crc32fast::hash(&payload);
        Self { header, payload }
    }

    /// Build the response frame for this request.
    pub fn make_response(&self, payload: Vec<u8>) -> Self {
        Self::with_flags(
            self.header.opcode,
            self.header.request_id,
            payload,
            FrameFlags::response(),
        )
    }

    /// Build an error response for this request carrying `message`.
    pub fn make_error(&self, message: &str) -> Self {
        Self::with_flags(
            self.header.opcode,
            self.header.request_id,
            message.as_bytes().to_vec(),
            FrameFlags {
                response: true,
                error: true,
                one_way: false,
            },
        )
    }

    /// Whether the peer answered with an error instead of a reply.
    pub fn is_error(&self) -> bool {
        self.header.flags.error
    }

    /// Request id used to match responses.
    pub fn request_id(&self) -> u64 {
        self.header.request_id
    }

    /// Operation carried by this frame.
    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    /// Whether this frame answers an earlier request.
    pub fn is_response(&self) -> bool {
        self.header.flags.response
    }

    /// Header followed by payload, ready for the socket.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a complete frame from a contiguous buffer.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(TransportError::InvalidFrame {
                reason: format!("short frame: {} bytes", buf.len()),
            });
        }
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        header_buf.copy_from_slice(&buf[..FRAME_HEADER_SIZE]);
        let header = FrameHeader::decode(&header_buf)?;
        header.check_payload_length()?;
        let body = &buf[FRAME_HEADER_SIZE..];
        if body.len() != header.payload_length as usize {
            return Err(TransportError::InvalidFrame {
                reason: format!(
                    "payload length {} does not match header {}",
                    body.len(),
                    header.payload_length
                ),
            });
        }
        let frame = Frame {
            header,
            payload: body.to_vec(),
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Verify the payload against the header checksum.
    pub fn validate(&self) -> Result<()> {
        let computed = crc32fast::hash(&self.payload);
        if computed != self.header.checksum {
            return Err(TransportError::ChecksumMismatch {
                expected: self.header.checksum,
                computed,
            });
        }
        Ok(())
    }

    /// Read one frame from a byte stream.
    ///
    /// The advertised payload length is bounded before anything is allocated.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        reader.read_exact(&mut header_buf).await?;
        let header = FrameHeader::decode(&header_buf)?;
        header.check_payload_length()?;
        let mut payload = vec![0u8; header.payload_length as usize];
        reader.read_exact(&mut payload).await?;
        let frame = Frame { header, payload };
        frame.validate()?;
        Ok(frame)
    }

    /// Write this frame to a byte stream and flush it.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}
