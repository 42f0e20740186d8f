use crate::error::Result;
use bytes::{BufMut, BytesMut};

// Stream IDs
/// First video stream_id.
pub const STREAM_ID_VIDEO: u8 = 0xe0;
/// First audio stream_id.
pub const STREAM_ID_AUDIO: u8 = 0xc0;

// PIDs
/// Program association table PID.
pub const PID_PAT: u16 = 0x0000;
/// PMT PID used by the writer.
pub const PID_PMT: u16 = 0x1000;
/// Stuffing packets.
pub const PID_NULL: u16 = 0x1fff;

// Table IDs
/// PAT table_id.
pub const TABLE_ID_PAT: u8 = 0x00;
/// PMT table_id.
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary Stream Types
/// ITU-T H.264 video.
pub const STREAM_TYPE_H264: u8 = 0x1b;
/// ITU-T H.265 video.
pub const STREAM_TYPE_H265: u8 = 0x24;
/// ADTS AAC audio.
pub const STREAM_TYPE_AAC: u8 = 0x0f;

// Descriptor tags
/// CA_descriptor.
pub const DESCRIPTOR_TAG_CA: u8 = 0x09;

// Constants
/// Size of one TS packet.
pub const TS_PACKET_SIZE: usize = 188;
/// Size of the fixed packet header.
pub const TS_HEADER_SIZE: usize = 4;
/// Payload bytes in a packet without adaptation field.
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
/// First byte of every TS packet.
pub const SYNC_BYTE: u8 = 0x47;
/// PES timestamp clock rate.
pub const PTS_HZ: u64 = 90_000;

/// One program_number to PID mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PATEntry {
    /// 0 for the network PID entry.
    pub program_number: u16,
    /// PID of the network information table, program 0 only.
    pub network_pid: u16,
    /// PID of the program's PMT.
    pub program_map_pid: u16,
}

/// Program association table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PAT {
    /// Entries in table order.
    pub entries: Vec<PATEntry>,
}

impl PAT {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// First program's PMT PID; network entries (program 0) are skipped.
    pub fn first_program_pid(&self) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.program_number != 0)
            .map(|e| e.program_map_pid)
    }

    /// Writes the entry loop of the section body.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        for entry in &self.entries {
            buf.put_u16(entry.program_number);
            if entry.program_number == 0 {
                buf.put_u16(entry.network_pid & 0x1fff | 7 << 13);
            } else {
                buf.put_u16(entry.program_map_pid & 0x1fff | 7 << 13);
            }
        }
        Ok(())
    }
}

/// A tag/length descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// `descriptor_tag`.
    pub tag: u8,
    /// Descriptor body.
    pub data: Vec<u8>,
}

impl Descriptor {
    /// Conditional access descriptor: CA_system_ID, CA_PID, private bytes.
    pub fn conditional_access(system_id: u16, ca_pid: u16, private: &[u8]) -> Self {
        let mut data = Vec::with_capacity(4 + private.len());
        data.extend_from_slice(&system_id.to_be_bytes());
        data.extend_from_slice(&(ca_pid & 0x1fff | 7 << 13).to_be_bytes());
        data.extend_from_slice(private);
        Self {
            tag: DESCRIPTOR_TAG_CA,
            data,
        }
    }

    /// CA_system_ID when this is a well-formed CA descriptor.
    pub fn ca_system_id(&self) -> Option<u16> {
        if self.tag != DESCRIPTOR_TAG_CA || self.data.len() < 4 {
            return None;
        }
        Some(u16::from_be_bytes([self.data[0], self.data[1]]))
    }
}

/// One stream of a PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    /// `stream_type`, see the `STREAM_TYPE_*` constants.
    pub stream_type: u8,
    /// PID carrying the stream.
    pub elementary_pid: u16,
    /// ES_info descriptors.
    pub descriptors: Vec<Descriptor>,
}

/// Program map table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PMT {
    /// PID carrying the program clock reference.
    pub pcr_pid: u16,
    /// Program_info descriptors.
    pub program_descriptors: Vec<Descriptor>,
    /// Streams in table order.
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

impl PMT {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the section body after the section header.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16(self.pcr_pid & 0x1fff | 7 << 13);

        let prog_desc_len = self
            .program_descriptors
            .iter()
            .map(|d| 2 + d.data.len())
            .sum::<usize>();
        buf.put_u16((prog_desc_len as u16) & 0x3ff | 0xf << 12);

        for desc in &self.program_descriptors {
            buf.put_u8(desc.tag);
            buf.put_u8(desc.data.len() as u8);
            buf.put_slice(&desc.data);
        }

        for info in &self.elementary_stream_infos {
            buf.put_u8(info.stream_type);
            buf.put_u16(info.elementary_pid & 0x1fff | 7 << 13);

            let es_desc_len = info
                .descriptors
                .iter()
                .map(|d| 2 + d.data.len())
                .sum::<usize>();
            buf.put_u16((es_desc_len as u16) & 0x3ff | 0xf << 12);

            for desc in &info.descriptors {
                buf.put_u8(desc.tag);
                buf.put_u8(desc.data.len() as u8);
                buf.put_slice(&desc.data);
            }
        }

        Ok(())
    }
}

/// Decoded adaptation field flags.
#[derive(Debug, Clone, Default)]
pub struct AdaptationField {
    /// Value of the adaptation_field_length byte.
    pub length: usize,
    /// `discontinuity_indicator`.
    pub discontinuity: bool,
    /// Set on a packet where decoding may start.
    pub random_access: bool,
    /// `elementary_stream_priority_indicator`.
    pub es_priority: bool,
    /// PCR in 27 MHz units, if present.
    pub pcr: Option<u64>,
}

/// The fixed 4-byte TS packet header.
#[derive(Debug, Clone)]
pub struct TSHeader {
    /// Always [`SYNC_BYTE`].
    pub sync_byte: u8,
    /// `transport_error_indicator`.
    pub transport_error: bool,
    /// Set on the first packet of a PES or section.
    pub payload_unit_start: bool,
    /// `transport_priority`.
    pub transport_priority: bool,
    /// 13-bit packet identifier.
    pub pid: u16,
    /// `transport_scrambling_control`, 0 for clear.
    pub scrambling_control: u8,
    /// An adaptation field follows the header.
    pub adaptation_field_exists: bool,
    /// A payload follows the header or adaptation field.
    pub contains_payload: bool,
    /// 4-bit counter per PID.
    pub continuity_counter: u8,
}

impl Default for TSHeader {
    fn default() -> Self {
        Self {
            sync_byte: SYNC_BYTE,
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: 0,
            scrambling_control: 0,
            adaptation_field_exists: false,
            contains_payload: true,
            continuity_counter: 0,
        }
    }
}

impl TSHeader {
    /// Writes the 4 header bytes.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.sync_byte);

        let mut b1 = 0u8;
        if self.transport_error {
            b1 |= 0x80;
        }
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        if self.transport_priority {
            b1 |= 0x20;
        }
        b1 |= ((self.pid >> 8) & 0x1f) as u8;
        buf.put_u8(b1);

        buf.put_u8((self.pid & 0xff) as u8);

        let mut b3 = self.scrambling_control << 6;
        if self.adaptation_field_exists {
            b3 |= 0x20;
        }
        if self.contains_payload {
            b3 |= 0x10;
        }
        b3 |= self.continuity_counter & 0x0f;
        buf.put_u8(b3);

        Ok(())
    }
}
