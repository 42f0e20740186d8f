use crate::error::{DemuxError, Result};
use bytes::{BufMut, BytesMut};

/// Size of the PES header up to and including PES_header_data_length.
pub const PES_FIXED_HEADER_SIZE: usize = 9;

/// Packetized Elementary Stream (PES) header.
///
/// Only the fields the demuxer uses are kept; the optional ESCR, ES rate,
/// trick mode and extension fields are skipped over by `header_data_length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PESHeader {
    /// Stream identifier indicating content type (video/audio/etc.)
    pub stream_id: u8,
    /// Bytes following this field; 0 means unbounded (video only)
    pub packet_length: u16,
    /// `PES_scrambling_control`, 0 for clear.
    pub scrambling_control: u8,
    /// `data_alignment_indicator`.
    pub data_alignment: bool,
    /// Length of the optional header data following the flag bytes
    pub header_data_length: u8,
    /// Presentation Time Stamp (33 bits, 90 kHz)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits, 90 kHz)
    pub dts: Option<u64>,
}

impl PESHeader {
    /// Header for `stream_id` without timestamps.
    pub fn new(stream_id: u8) -> Self {
        Self {
            stream_id,
            packet_length: 0,
            scrambling_control: 0,
            data_alignment: false,
            header_data_length: 0,
            pts: None,
            dts: None,
        }
    }

    /// Adds a PTS in 90 kHz ticks.
    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts);
        self.header_data_length = self.timestamp_bytes();
        self
    }

    /// Adds a DTS in 90 kHz ticks. Only written alongside a PTS.
    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = Some(dts);
        self.header_data_length = self.timestamp_bytes();
        self
    }

    fn timestamp_bytes(&self) -> u8 {
        match (self.pts, self.dts) {
            (Some(_), Some(_)) => 10,
            (Some(_), None) | (None, Some(_)) => 5,
            (None, None) => 0,
        }
    }

    /// Total header size, start code included.
    pub fn len(&self) -> usize {
        PES_FIXED_HEADER_SIZE + self.header_data_length as usize
    }

    /// Parses the header at the start of a reassembled PES packet and returns
    /// it with the offset of the payload.
    pub fn parse(data: &[u8]) -> Result<(PESHeader, usize)> {
        if data.len() < PES_FIXED_HEADER_SIZE {
            return Err(DemuxError::InvalidData("PES header too short".into()));
        }
        if data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
            return Err(DemuxError::InvalidData("Invalid PES start code".into()));
        }

        let stream_id = data[3];
        let packet_length = u16::from_be_bytes([data[4], data[5]]);
        let flags1 = data[6];
        let flags2 = data[7];
        let header_data_length = data[8];
        let payload_offset = PES_FIXED_HEADER_SIZE + header_data_length as usize;
        if data.len() < payload_offset {
            return Err(DemuxError::InvalidData("PES optional header truncated".into()));
        }

        let optional = &data[PES_FIXED_HEADER_SIZE..payload_offset];
        let pts_dts_flags = flags2 >> 6;
        let pts = if pts_dts_flags & 0x02 != 0 {
            Some(read_timestamp(optional, 0)?)
        } else {
            None
        };
        let dts = if pts_dts_flags == 0x03 {
            Some(read_timestamp(optional, 5)?)
        } else {
            None
        };

        Ok((
            PESHeader {
                stream_id,
                packet_length,
                scrambling_control: (flags1 >> 4) & 0x03,
                data_alignment: (flags1 & 0x04) != 0,
                header_data_length,
                pts,
                dts,
            },
            payload_offset,
        ))
    }

    /// Writes the start code, the fixed fields and any timestamps.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&[0x00, 0x00, 0x01]);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);

        // '10' marker, scrambling, priority, alignment, copyright, original
        let mut flags1 = 0x80 | (self.scrambling_control & 0x03) << 4;
        if self.data_alignment {
            flags1 |= 0x04;
        }
        buf.put_u8(flags1);

        let mut flags2 = 0u8;
        if self.pts.is_some() {
            flags2 |= 0x80;
        }
        if self.dts.is_some() {
            flags2 |= 0x40;
        }
        buf.put_u8(flags2);
        buf.put_u8(self.header_data_length);

        if let Some(pts) = self.pts {
            let marker = if self.dts.is_some() { 0x30 } else { 0x20 };
            write_timestamp(buf, marker, pts);
        }
        if let Some(dts) = self.dts {
            write_timestamp(buf, 0x10, dts);
        }

        Ok(())
    }
}

/// A complete PES packet: header plus payload.
#[derive(Debug)]
pub struct PESPacket {
    /// The header; `packet_length` is set on write.
    pub header: PESHeader,
    /// Elementary stream bytes.
    pub payload: Vec<u8>,
}

impl PESPacket {
    /// Packet on `stream_id` carrying `payload`.
    pub fn new(stream_id: u8, payload: Vec<u8>) -> Self {
        Self {
            header: PESHeader::new(stream_id),
            payload,
        }
    }

    /// See [`PESHeader::with_pts`].
    pub fn with_pts(mut self, pts: u64) -> Self {
        self.header = self.header.with_pts(pts);
        self
    }

    /// See [`PESHeader::with_dts`].
    pub fn with_dts(mut self, dts: u64) -> Self {
        self.header = self.header.with_dts(dts);
        self
    }

    /// Writes the packet. With `bounded` the PES_packet_length field carries
    /// the real size, otherwise it is 0.
    pub fn write_to(&mut self, buf: &mut BytesMut, bounded: bool) -> Result<()> {
        self.header.packet_length = if bounded {
            let len = self.len() - 6;
            if len > u16::MAX as usize {
                return Err(DemuxError::InvalidData(format!(
                    "PES packet of {} bytes cannot be bounded",
                    len
                )));
            }
            len as u16
        } else {
            0
        };
        self.header.write_to(buf)?;
        buf.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Serialized size, header included.
    pub fn len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    /// True for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

fn read_timestamp(data: &[u8], at: usize) -> Result<u64> {
    if data.len() < at + 5 {
        return Err(DemuxError::InvalidData("PES timestamp truncated".into()));
    }
    let d = &data[at..at + 5];
    Ok(((d[0] as u64 & 0x0E) << 29)
        | ((d[1] as u64) << 22)
        | ((d[2] as u64 & 0xFE) << 14)
        | ((d[3] as u64) << 7)
        | ((d[4] as u64 & 0xFE) >> 1))
}

fn write_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) {
    let ts = ts & 0x1FFFFFFFF; // 33 bits

    buf.put_u8(marker | ((ts >> 29) & 0x0E) as u8 | 0x01);
    buf.put_u16((((ts >> 14) & 0xFFFE) | 0x01) as u16);
    buf.put_u16((((ts << 1) & 0xFFFE) | 0x01) as u16);
}
