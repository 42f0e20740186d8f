use bytes::{BufMut, Bytes, BytesMut};

use super::pes::PESPacket;
use super::types::*;
use crate::error::{DemuxError, Result};
use crate::utils::Crc32Mpeg2;

#[derive(Debug)]
struct WriterStream {
    pid: u16,
    stream_id: u8,
    /// Audio PES carry their real length; video PES are unbounded.
    bounded: bool,
    continuity_counter: u8,
}

/// Synchronous single-program Transport Stream writer.
///
/// Produces PAT/PMT and PES-carrying packets into an in-memory buffer.
/// Used to build test fixtures and by the demo binary.
pub struct TsWriter {
    streams: Vec<WriterStream>,
    pat: PAT,
    pmt: PMT,
    pat_cc: u8,
    pmt_cc: u8,
    crc: Crc32Mpeg2,
    out: BytesMut,
}

impl Default for TsWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TsWriter {
    /// Writer with no streams.
    pub fn new() -> Self {
        let mut pat = PAT::new();
        pat.entries.push(PATEntry {
            program_number: 1,
            network_pid: 0,
            program_map_pid: PID_PMT,
        });
        Self {
            streams: Vec::new(),
            pat,
            pmt: PMT::new(),
            pat_cc: 0,
            pmt_cc: 0,
            crc: Crc32Mpeg2::new(),
            out: BytesMut::new(),
        }
    }

    /// Adds an elementary stream and returns its PID.
    pub fn add_stream(&mut self, stream_type: u8) -> Result<u16> {
        let (stream_id, bounded) = match stream_type {
            STREAM_TYPE_H264 | STREAM_TYPE_H265 => (STREAM_ID_VIDEO, false),
            STREAM_TYPE_AAC => (STREAM_ID_AUDIO, true),
            other => {
                return Err(DemuxError::InvalidData(format!(
                    "Unsupported stream type 0x{:02x}",
                    other
                )))
            }
        };

        let pid = 0x100 + self.streams.len() as u16;
        if self.streams.is_empty() {
            self.pmt.pcr_pid = pid;
        }
        self.pmt.elementary_stream_infos.push(ElementaryStreamInfo {
            stream_type,
            elementary_pid: pid,
            descriptors: Vec::new(),
        });
        self.streams.push(WriterStream {
            pid,
            stream_id,
            bounded,
            continuity_counter: 0,
        });
        Ok(pid)
    }

    /// Declares conditional access for the whole program.
    pub fn add_ca_descriptor(&mut self, system_id: u16, private: &[u8]) {
        self.pmt
            .program_descriptors
            .push(Descriptor::conditional_access(system_id, PID_NULL, private));
    }

    /// Writes PAT and PMT.
    pub fn write_tables(&mut self) -> Result<()> {
        let mut section = BytesMut::new();
        self.pat.write_to(&mut section)?;
        let cc = Self::next_cc(&mut self.pat_cc);
        self.write_section(PID_PAT, TABLE_ID_PAT, 1, &section, cc)?;

        let mut section = BytesMut::new();
        self.pmt.write_to(&mut section)?;
        let cc = Self::next_cc(&mut self.pmt_cc);
        self.write_section(PID_PMT, TABLE_ID_PMT, 1, &section, cc)
    }

    fn write_section(
        &mut self,
        pid: u16,
        table_id: u8,
        extension: u16,
        body: &[u8],
        continuity_counter: u8,
    ) -> Result<()> {
        // table header (8) + body + CRC (4), after the pointer field
        if 1 + 8 + body.len() + 4 > TS_PAYLOAD_SIZE {
            return Err(DemuxError::InvalidData("PSI section exceeds one packet".into()));
        }

        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
        let header = TSHeader {
            payload_unit_start: true,
            pid,
            continuity_counter,
            ..Default::default()
        };
        header.write_to(&mut buf)?;
        buf.put_u8(0); // pointer field

        let start = buf.len();
        let section_length = 5 + body.len() + 4;
        buf.put_u8(table_id);
        buf.put_u16(0xB000 | (section_length as u16 & 0x03FF));
        buf.put_u16(extension);
        buf.put_u8(0xC1); // version 0, current
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_slice(body);

        let crc = self.crc.calculate(&buf[start..]);
        buf.put_u32(crc);

        buf.resize(TS_PACKET_SIZE, 0xFF);
        self.out.put_slice(&buf);
        Ok(())
    }

    /// Writes one access unit as a PES packet on `pid`. Timestamps are
    /// 90 kHz ticks; `random_access` marks the first TS packet.
    pub fn write_pes(
        &mut self,
        pid: u16,
        payload: &[u8],
        pts: Option<u64>,
        dts: Option<u64>,
        random_access: bool,
    ) -> Result<()> {
        let index = self
            .streams
            .iter()
            .position(|s| s.pid == pid)
            .ok_or_else(|| DemuxError::InvalidData(format!("Unknown PID 0x{:04x}", pid)))?;

        let mut pes = PESPacket::new(self.streams[index].stream_id, payload.to_vec());
        if let Some(pts) = pts {
            pes = pes.with_pts(pts);
        }
        if let Some(dts) = dts {
            pes = pes.with_dts(dts);
        }
        let mut pes_bytes = BytesMut::with_capacity(pes.len());
        pes.write_to(&mut pes_bytes, self.streams[index].bounded)?;

        let mut remaining: &[u8] = &pes_bytes;
        let mut first = true;
        while !remaining.is_empty() {
            let flagged = first && random_access;
            let capacity = if flagged { TS_PAYLOAD_SIZE - 2 } else { TS_PAYLOAD_SIZE };
            let take = remaining.len().min(capacity);
            let adaptation_len = TS_PAYLOAD_SIZE - take;

            let stream = &mut self.streams[index];
            let cc = Self::next_cc(&mut stream.continuity_counter);
            let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
            let header = TSHeader {
                payload_unit_start: first,
                pid,
                adaptation_field_exists: adaptation_len > 0,
                continuity_counter: cc,
                ..Default::default()
            };
            header.write_to(&mut buf)?;
            Self::write_adaptation_field(&mut buf, adaptation_len, flagged);
            buf.put_slice(&remaining[..take]);

            self.out.put_slice(&buf);
            remaining = &remaining[take..];
            first = false;
        }

        Ok(())
    }

    /// Adaptation field occupying exactly `total` bytes, length byte included.
    fn write_adaptation_field(buf: &mut BytesMut, total: usize, random_access: bool) {
        if total == 0 {
            return;
        }
        buf.put_u8((total - 1) as u8);
        if total >= 2 {
            buf.put_u8(if random_access { 0x40 } else { 0x00 });
            for _ in 2..total {
                buf.put_u8(0xFF);
            }
        }
    }

    /// Appends a null packet.
    pub fn write_null_packet(&mut self) {
        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
        let header = TSHeader {
            pid: PID_NULL,
            ..Default::default()
        };
        // writing into a BytesMut cannot fail
        let _ = header.write_to(&mut buf);
        buf.resize(TS_PACKET_SIZE, 0xFF);
        self.out.put_slice(&buf);
    }

    fn next_cc(counter: &mut u8) -> u8 {
        let current = *counter;
        *counter = (*counter + 1) & 0x0F;
        current
    }

    /// Bytes written and not yet taken.
    pub fn len(&self) -> usize {
        self.out.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// Takes everything written so far.
    pub fn take(&mut self) -> Bytes {
        self.out.split().freeze()
    }

    /// Consumes the writer and returns everything written.
    pub fn finish(self) -> Bytes {
        self.out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::TSPacketParser;
    use super::*;

    #[test]
    fn test_tables_are_valid_sections() {
        let mut writer = TsWriter::new();
        writer.add_stream(STREAM_TYPE_H264).unwrap();
        writer.add_stream(STREAM_TYPE_AAC).unwrap();
        writer.write_tables().unwrap();
        let out = writer.finish();
        assert_eq!(out.len(), 2 * TS_PACKET_SIZE);

        let parser = TSPacketParser::new();
        let pat = parser.parse_section(&out[4..TS_PACKET_SIZE]).unwrap().unwrap();
        assert_eq!(parser.parse_pat(pat.body).unwrap().first_program_pid(), Some(PID_PMT));

        let pmt_packet = &out[TS_PACKET_SIZE..];
        assert_eq!(parser.parse_header(pmt_packet).unwrap().pid, PID_PMT);
        let pmt = parser.parse_section(&pmt_packet[4..]).unwrap().unwrap();
        let pmt = parser.parse_pmt(pmt.body).unwrap();
        assert_eq!(pmt.elementary_stream_infos.len(), 2);
        assert_eq!(pmt.elementary_stream_infos[1].stream_type, STREAM_TYPE_AAC);
    }

    #[test]
    fn test_pes_split_across_packets() {
        let mut writer = TsWriter::new();
        let pid = writer.add_stream(STREAM_TYPE_H264).unwrap();
        writer
            .write_pes(pid, &[0xAB; 400], Some(9000), None, true)
            .unwrap();
        let out = writer.finish();
        assert_eq!(out.len() % TS_PACKET_SIZE, 0);
        assert_eq!(out.len(), 3 * TS_PACKET_SIZE);

        let parser = TSPacketParser::new();
        let first = parser.parse_header(&out).unwrap();
        assert!(first.payload_unit_start);
        let adaptation = parser.parse_adaptation_field(&out).unwrap().unwrap();
        assert!(adaptation.random_access);

        let second = parser.parse_header(&out[TS_PACKET_SIZE..]).unwrap();
        assert!(!second.payload_unit_start);
        assert_eq!(second.continuity_counter, 1);
    }

    #[test]
    fn test_unknown_pid() {
        let mut writer = TsWriter::new();
        assert!(writer.write_pes(0x200, &[1], None, None, false).is_err());
        assert!(writer.add_stream(0x03).is_err());
    }
}
