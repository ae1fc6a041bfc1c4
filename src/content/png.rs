//! PNG metadata chunk stripping.

/// Eight-byte PNG file signature.
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Chunk types that carry metadata and are removed.
const STRIPPED_CHUNKS: [&[u8; 4]; 4] = [b"eXIf", b"tEXt", b"zTXt", b"iTXt"];

/// Strip metadata chunks (`eXIf`, `tEXt`, `zTXt`, `iTXt`) from a PNG stream.
///
/// All other chunks, including `IHDR`, `IDAT`, and `IEND`, are copied
/// byte-identical with their CRCs intact. Returns `None` if the input is
/// not a well-formed PNG, in which case the caller should use the original
/// bytes unchanged.
#[must_use]
pub fn strip_png_metadata(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.len() < PNG_SIGNATURE.len() || bytes[..8] != PNG_SIGNATURE {
        return None;
    }

    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&PNG_SIGNATURE);

    let mut i = PNG_SIGNATURE.len();
    while i < bytes.len() {
        // length(4) + type(4) + data(length) + crc(4)
        if i + 8 > bytes.len() {
            return None;
        }
        let len = u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]) as usize;
        let chunk_type: &[u8] = &bytes[i + 4..i + 8];
        let chunk_end = i.checked_add(12)?.checked_add(len)?;
        if chunk_end > bytes.len() {
            return None;
        }

        let stripped = STRIPPED_CHUNKS.iter().any(|t| t.as_slice() == chunk_type);
        if !stripped {
            out.extend_from_slice(&bytes[i..chunk_end]);
        }

        if chunk_type == b"IEND" {
            // Anything trailing the image is copied verbatim.
            out.extend_from_slice(&bytes[chunk_end..]);
            return Some(out);
        }
        i = chunk_end;
    }

    // Missing IEND; still structurally valid chunk-wise.
    Some(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn chunk(chunk_type: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut c = Vec::new();
        c.extend_from_slice(&(data.len() as u32).to_be_bytes());
        c.extend_from_slice(chunk_type);
        c.extend_from_slice(data);
        c.extend_from_slice(&[0u8; 4]); // CRC not validated, only copied
        c
    }

    /// Minimal PNG: signature, IHDR, tEXt, iTXt, IDAT, eXIf, IEND.
    pub(crate) fn png_with_text_chunks() -> Vec<u8> {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend(chunk(b"IHDR", &[0u8; 13]));
        png.extend(chunk(b"tEXt", b"Comment\0shot on a phone"));
        png.extend(chunk(b"iTXt", b"XML:com.adobe.xmp\0\0\0\0\0<xmp/>"));
        png.extend(chunk(b"IDAT", &[1, 2, 3, 4]));
        png.extend(chunk(b"eXIf", &[9, 9]));
        png.extend(chunk(b"IEND", &[]));
        png
    }

    #[test]
    fn strips_metadata_chunks() {
        let png = png_with_text_chunks();
        let stripped = strip_png_metadata(&png).unwrap();

        let mut expected = PNG_SIGNATURE.to_vec();
        expected.extend(chunk(b"IHDR", &[0u8; 13]));
        expected.extend(chunk(b"IDAT", &[1, 2, 3, 4]));
        expected.extend(chunk(b"IEND", &[]));
        assert_eq!(stripped, expected);
    }

    #[test]
    fn preserves_png_without_metadata() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend(chunk(b"IHDR", &[0u8; 13]));
        png.extend(chunk(b"IDAT", &[5, 6]));
        png.extend(chunk(b"IEND", &[]));

        assert_eq!(strip_png_metadata(&png).unwrap(), png);
    }

    #[test]
    fn preserves_ztxt_removal_and_other_ancillary_chunks() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend(chunk(b"IHDR", &[0u8; 13]));
        png.extend(chunk(b"gAMA", &[0, 0, 0xB1, 0x8F]));
        png.extend(chunk(b"zTXt", b"Description\0\0compressed"));
        png.extend(chunk(b"IDAT", &[7]));
        png.extend(chunk(b"IEND", &[]));

        let stripped = strip_png_metadata(&png).unwrap();
        let mut expected = PNG_SIGNATURE.to_vec();
        expected.extend(chunk(b"IHDR", &[0u8; 13]));
        expected.extend(chunk(b"gAMA", &[0, 0, 0xB1, 0x8F]));
        expected.extend(chunk(b"IDAT", &[7]));
        expected.extend(chunk(b"IEND", &[]));
        assert_eq!(stripped, expected);
    }

    #[test]
    fn rejects_truncated_chunk() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(&[0, 0, 1, 0]); // claims 256-byte chunk
        png.extend_from_slice(b"IDAT");
        assert!(strip_png_metadata(&png).is_none());
    }

    #[test]
    fn rejects_bad_signature() {
        assert!(strip_png_metadata(b"\xFF\xD8 not a png").is_none());
        assert!(strip_png_metadata(&[]).is_none());
    }
}
