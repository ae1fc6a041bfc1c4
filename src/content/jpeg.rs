//! JPEG APP1 segment stripping.

/// JPEG markers. Segment layout is `FF <marker> <u16 length> <payload>`,
/// where the length includes its own two bytes.
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP1: u8 = 0xE1;

/// Strip APP1 segments (Exif and XMP metadata) from a JPEG stream.
///
/// JFIF (APP0), ICC (APP2), Adobe (APP14), and all other segments are
/// preserved byte-identical, and everything from the start-of-scan marker
/// onward is copied verbatim. Returns `None` if the input is not a
/// well-formed JPEG, in which case the caller should use the original
/// bytes unchanged.
#[must_use]
pub fn strip_jpeg_metadata(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != SOI {
        return None;
    }

    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&bytes[..2]);

    let mut i = 2;
    loop {
        if i + 1 >= bytes.len() {
            return None;
        }
        if bytes[i] != 0xFF {
            return None;
        }

        // Fill bytes: the marker may be preceded by extra 0xFF padding.
        let mut marker_at = i + 1;
        while marker_at < bytes.len() && bytes[marker_at] == 0xFF {
            marker_at += 1;
        }
        if marker_at >= bytes.len() {
            return None;
        }
        let marker = bytes[marker_at];

        if marker == SOS || marker == EOI {
            // Scan data and anything after it is copied verbatim.
            out.extend_from_slice(&bytes[i..]);
            return Some(out);
        }

        // Standalone markers (RSTn, TEM) carry no length field.
        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            out.extend_from_slice(&bytes[i..=marker_at]);
            i = marker_at + 1;
            continue;
        }

        if marker_at + 2 >= bytes.len() {
            return None;
        }
        let len = u16::from_be_bytes([bytes[marker_at + 1], bytes[marker_at + 2]]) as usize;
        if len < 2 {
            return None;
        }
        let segment_end = marker_at + 1 + len;
        if segment_end > bytes.len() {
            return None;
        }

        if marker != APP1 {
            out.extend_from_slice(&bytes[i..segment_end]);
        }
        i = segment_end;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut seg = vec![0xFF, marker];
        seg.extend_from_slice(&((payload.len() as u16 + 2).to_be_bytes()));
        seg.extend_from_slice(payload);
        seg
    }

    /// Minimal JPEG: SOI, APP0/JFIF, APP1/Exif, APP2/ICC, SOS + scan, EOI.
    pub(crate) fn jpeg_with_exif() -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend(segment(0xE0, b"JFIF\0\x01\x02"));
        jpeg.extend(segment(0xE1, b"Exif\0\0fake-exif-payload"));
        jpeg.extend(segment(0xE2, b"ICC_PROFILE\0data"));
        jpeg.extend(segment(0xDA, &[0x01, 0x02]));
        jpeg.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn strips_app1_only() {
        let jpeg = jpeg_with_exif();
        let stripped = strip_jpeg_metadata(&jpeg).unwrap();

        let mut expected = vec![0xFF, 0xD8];
        expected.extend(segment(0xE0, b"JFIF\0\x01\x02"));
        expected.extend(segment(0xE2, b"ICC_PROFILE\0data"));
        expected.extend(segment(0xDA, &[0x01, 0x02]));
        expected.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xFF, 0xD9]);
        assert_eq!(stripped, expected);
    }

    #[test]
    fn preserves_jpeg_without_app1() {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend(segment(0xE0, b"JFIF\0"));
        jpeg.extend(segment(0xDA, &[0x00]));
        jpeg.extend_from_slice(&[0x01, 0xFF, 0xD9]);

        assert_eq!(strip_jpeg_metadata(&jpeg).unwrap(), jpeg);
    }

    #[test]
    fn strips_multiple_app1_segments() {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend(segment(0xE1, b"Exif\0\0a"));
        jpeg.extend(segment(0xE1, b"http://ns.adobe.com/xap/1.0/\0<xmp/>"));
        jpeg.extend(segment(0xDA, &[0x00]));
        jpeg.extend_from_slice(&[0xFF, 0xD9]);

        let stripped = strip_jpeg_metadata(&jpeg).unwrap();
        let mut expected = vec![0xFF, 0xD8];
        expected.extend(segment(0xDA, &[0x00]));
        expected.extend_from_slice(&[0xFF, 0xD9]);
        assert_eq!(stripped, expected);
    }

    #[test]
    fn scan_data_is_verbatim() {
        // Bytes after SOS may contain 0xFF sequences that are not markers;
        // they must not be parsed.
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend(segment(0xDA, &[0x00]));
        jpeg.extend_from_slice(&[0xFF, 0x00, 0xFF, 0x00, 0xFF, 0xD9]);

        assert_eq!(strip_jpeg_metadata(&jpeg).unwrap(), jpeg);
    }

    #[test]
    fn rejects_truncated_segment() {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[0xFF, 0xE1, 0x00, 0xFF]); // claims 255-byte segment
        assert!(strip_jpeg_metadata(&jpeg).is_none());
    }

    #[test]
    fn rejects_non_jpeg() {
        assert!(strip_jpeg_metadata(b"PNG or something").is_none());
        assert!(strip_jpeg_metadata(&[]).is_none());
    }
}
