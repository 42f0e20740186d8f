use super::types::*;
use crate::error::{DemuxError, Result};
use crate::utils::Crc32Mpeg2;

/// A PSI section extracted from one TS payload.
#[derive(Debug, PartialEq, Eq)]
pub struct Section<'a> {
    /// `table_id`.
    pub table_id: u8,
    /// table_id_extension (transport_stream_id for PAT, program_number for PMT)
    pub extension: u16,
    /// `version_number`.
    pub version: u8,
    /// Table body between the fixed section header and the CRC.
    pub body: &'a [u8],
}

/// Stateless parsing of TS packet headers and PSI tables.
pub struct TSPacketParser {
    crc: Crc32Mpeg2,
}

impl Default for TSPacketParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TSPacketParser {
    /// Parser with a CRC table ready.
    pub fn new() -> Self {
        Self {
            crc: Crc32Mpeg2::new(),
        }
    }

    /// Parses the 4-byte header at the start of `data`.
    pub fn parse_header(&self, data: &[u8]) -> Result<TSHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(DemuxError::InvalidData("TS packet too short".into()));
        }

        if data[0] != SYNC_BYTE {
            return Err(DemuxError::InvalidData("Invalid sync byte".into()));
        }

        Ok(TSHeader {
            sync_byte: data[0],
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Parses the adaptation field of a whole TS packet, if it has one.
    pub fn parse_adaptation_field(&self, data: &[u8]) -> Result<Option<AdaptationField>> {
        if data.len() <= TS_HEADER_SIZE || (data[3] & 0x20) == 0 {
            return Ok(None);
        }

        let offset = TS_HEADER_SIZE;
        let length = data[offset] as usize;
        if data.len() < offset + 1 + length {
            return Err(DemuxError::InvalidData("Adaptation field too short".into()));
        }

        let mut field = AdaptationField {
            length,
            ..Default::default()
        };
        if length == 0 {
            return Ok(Some(field));
        }

        let flags = data[offset + 1];
        field.discontinuity = (flags & 0x80) != 0;
        field.random_access = (flags & 0x40) != 0;
        field.es_priority = (flags & 0x20) != 0;

        if (flags & 0x10) != 0 {
            let pos = offset + 2;
            if length < 7 {
                return Err(DemuxError::InvalidData("PCR data too short".into()));
            }
            let pcr_base = ((data[pos] as u64) << 25)
                | ((data[pos + 1] as u64) << 17)
                | ((data[pos + 2] as u64) << 9)
                | ((data[pos + 3] as u64) << 1)
                | ((data[pos + 4] & 0x80) as u64 >> 7);
            let pcr_ext = (((data[pos + 4] & 0x01) as u64) << 8) | (data[pos + 5] as u64);
            field.pcr = Some(pcr_base * 300 + pcr_ext);
        }

        Ok(Some(field))
    }

    /// Offset of the payload inside a TS packet.
    pub fn payload_offset(&self, header: &TSHeader, adaptation: Option<&AdaptationField>) -> usize {
        let mut offset = TS_HEADER_SIZE;
        if header.adaptation_field_exists {
            offset += 1 + adaptation.map_or(0, |a| a.length);
        }
        offset
    }

    /// Extracts a PSI section from a unit-start payload (pointer field
    /// first). `Ok(None)` when the section spills over into later packets.
    /// A CRC mismatch is an error.
    pub fn parse_section<'a>(&self, payload: &'a [u8]) -> Result<Option<Section<'a>>> {
        let pointer = *payload
            .first()
            .ok_or_else(|| DemuxError::InvalidData("PSI payload empty".into()))?
            as usize;
        let start = 1 + pointer;
        if payload.len() < start + 3 {
            return Err(DemuxError::InvalidData("PSI section header truncated".into()));
        }

        let section = &payload[start..];
        let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
        let total = 3 + section_length;
        if section_length < 9 {
            return Err(DemuxError::InvalidData(format!(
                "PSI section length {} too short",
                section_length
            )));
        }
        if section.len() < total {
            return Ok(None);
        }

        let section = &section[..total];
        if !self.crc.verify(section) {
            return Err(DemuxError::InvalidData(format!(
                "CRC mismatch in table 0x{:02x}",
                section[0]
            )));
        }

        Ok(Some(Section {
            table_id: section[0],
            extension: u16::from_be_bytes([section[3], section[4]]),
            version: (section[5] >> 1) & 0x1F,
            body: &section[8..total - 4],
        }))
    }

    /// Parses a PAT section body.
    pub fn parse_pat(&self, body: &[u8]) -> Result<PAT> {
        let mut pat = PAT::new();
        let mut pos = 0;

        while pos + 4 <= body.len() {
            let program_number = ((body[pos] as u16) << 8) | body[pos + 1] as u16;
            let pid = (((body[pos + 2] & 0x1F) as u16) << 8) | body[pos + 3] as u16;
            pat.entries.push(PATEntry {
                program_number,
                network_pid: if program_number == 0 { pid } else { 0 },
                program_map_pid: if program_number != 0 { pid } else { 0 },
            });
            pos += 4;
        }

        Ok(pat)
    }

    /// Parses a PMT section body.
    pub fn parse_pmt(&self, body: &[u8]) -> Result<PMT> {
        let mut pmt = PMT::new();
        let end = body.len();
        let mut pos = 0;

        if pos + 4 > end {
            return Err(DemuxError::InvalidData("PMT too short for PCR PID".into()));
        }

        pmt.pcr_pid = ((body[pos] as u16 & 0x1F) << 8) | body[pos + 1] as u16;
        pos += 2;

        let program_info_length = ((body[pos] as usize & 0x0F) << 8) | body[pos + 1] as usize;
        pos += 2;

        if pos + program_info_length > end {
            return Err(DemuxError::InvalidData("Program info data too short".into()));
        }
        pmt.program_descriptors = self.parse_descriptors(&body[pos..pos + program_info_length])?;
        pos += program_info_length;

        while pos + 5 <= end {
            let stream_type = body[pos];
            let elementary_pid = ((body[pos + 1] as u16 & 0x1F) << 8) | body[pos + 2] as u16;
            let es_info_length = ((body[pos + 3] as usize & 0x0F) << 8) | body[pos + 4] as usize;
            pos += 5;

            if pos + es_info_length > end {
                return Err(DemuxError::InvalidData("ES info data too short".into()));
            }

            let descriptors = self.parse_descriptors(&body[pos..pos + es_info_length])?;
            pos += es_info_length;

            pmt.elementary_stream_infos.push(ElementaryStreamInfo {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(pmt)
    }

    fn parse_descriptors(&self, data: &[u8]) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();
        let mut pos = 0;

        while pos + 2 <= data.len() {
            let tag = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(DemuxError::InvalidData("Descriptor data too short".into()));
            }

            descriptors.push(Descriptor {
                tag,
                data: data[pos..pos + length].to_vec(),
            });
            pos += length;
        }

        Ok(descriptors)
    }
}
