use super::*;
use crate::utils::BitReader;
use crate::DemuxError;
use pretty_assertions::assert_eq;

const SPS_320X240: [u8; 8] = [0x67, 0x42, 0xC0, 0x1E, 0xF4, 0x0A, 0x0F, 0xC8];
const PPS: [u8; 4] = [0x68, 0xCE, 0x38, 0x80];

#[test]
fn test_remove_emulation_prevention() {
    let mut parser = H264Parser::new();

    let input = vec![0x00, 0x00, 0x03, 0x01];
    let output = parser.remove_emulation_prevention(&input);
    assert_eq!(output, vec![0x00, 0x00, 0x01]);

    let input = vec![0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x02];
    let output = parser.remove_emulation_prevention(&input);
    assert_eq!(output, vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x02]);

    let input = vec![0x00, 0x01, 0x02, 0x03];
    let output = parser.remove_emulation_prevention(&input);
    assert_eq!(output, input);
}

#[test]
fn test_parse_nalu() {
    let mut parser = H264Parser::new();

    // nal_ref_idc=0, nal_type=1
    let nalu = parser.parse_nalu(&[0x01, 0x02, 0x03, 0x04]).unwrap();
    assert_eq!(nalu.nal_type, 1);
    assert_eq!(nalu.nal_ref_idc, 0);
    assert!(!nalu.is_idr());

    // nal_ref_idc=3, nal_type=5
    let nalu = parser.parse_nalu(&[0x65, 0x02, 0x03, 0x04]).unwrap();
    assert_eq!(nalu.nal_type, 5);
    assert_eq!(nalu.nal_ref_idc, 3);
    assert!(nalu.is_idr());

    assert!(parser.parse_nalu(&[]).is_err());
}

#[test]
fn test_dimensions() {
    let mut parser = H264Parser::new();
    assert_eq!(parser.dimensions(), None);

    let nalu = parser.parse_nalu(&SPS_320X240).unwrap();
    assert!(nalu.is_parameter_set());
    assert_eq!(parser.dimensions(), Some((320, 240)));

    let sps = parser.sps().unwrap();
    assert_eq!(sps.profile_idc, 66);
    assert_eq!(sps.level_idc, 30);
    assert_eq!(sps.constraint_flags, 0xC0);
}

#[test]
fn test_parse_pps() {
    let mut parser = H264Parser::new();
    parser.parse_nalu(&PPS).unwrap();
    let pps = parser.pps().unwrap();
    assert_eq!(pps.pic_parameter_set_id, 0);
    assert_eq!(pps.seq_parameter_set_id, 0);
    assert!(!pps.entropy_coding_mode_flag);
}

#[test]
fn test_truncated_sps() {
    let mut parser = H264Parser::new();
    assert!(parser.parse_sps(&SPS_320X240[..5]).is_err());
    assert!(parser.parse_sps(&PPS).is_err());
    assert_eq!(parser.dimensions(), None);
}

#[test]
fn test_oversized_sps_is_rejected() {
    let mut parser = H264Parser::new();
    // pic_width_in_mbs_minus1 = 2^32 - 2
    let sps = [
        0x67, 0x42, 0xC0, 0x1E, 0xF8, 0x00, 0x00, 0x00, 0x07, 0xFF, 0xFF, 0xFF, 0xFF, 0x40,
    ];
    let err = parser.parse_sps(&sps).unwrap_err();
    assert!(matches!(err, DemuxError::Codec(_)), "{:?}", err);
    assert_eq!(parser.dimensions(), None);
}

#[test]
fn test_extreme_scaling_deltas() {
    let mut writer = crate::utils::BitWriter::new();
    writer.write_signed_golomb(i32::MAX);
    writer.write_signed_golomb(-i32::MAX);
    writer.write_signed_golomb(-8);
    let data = writer.into_bytes();
    let mut reader = BitReader::new(&data);
    // the third delta brings next_scale to zero and ends the list
    H264Parser::skip_scaling_list(&mut reader, 16).unwrap();
}

#[test]
fn test_nal_unit_type_from_header() {
    assert_eq!(NALUnitType::from(0x67), NALUnitType::Sps);
    assert_eq!(NALUnitType::from(8), NALUnitType::Pps);
    assert_eq!(NALUnitType::from(0x65), NALUnitType::IdrSlice);
    assert_eq!(NALUnitType::from(0x09), NALUnitType::AccessUnitDelimiter);
    assert_eq!(NALUnitType::from(0x6E), NALUnitType::Other(14));
}
