//! Extra-bytes point dimensions declared in a LAS header.
//!
//! Producers append per-point attributes such as `total_thu` or `total_tvu`
//! after the standard record fields and describe them in a `LASF_Spec`
//! record 4, one 192-byte descriptor per attribute.

use las::Vlr;

const SPEC_USER_ID: &str = "LASF_Spec";
const EXTRA_BYTES_RECORD_ID: u16 = 4;
const DESCRIPTOR_LEN: usize = 192;

const OPTION_SCALE: u8 = 0x08;
const OPTION_OFFSET: u8 = 0x10;

/// One attribute stored in the extra bytes of every point.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraBytesField {
    pub name: String,
    /// Byte offset inside the point's extra bytes.
    pub start: usize,
    data_type: u8,
    scale: f64,
    offset: f64,
}

impl ExtraBytesField {
    /// Scaled value of this field in one point's extra bytes.
    ///
    /// `None` for array and undocumented types, or when the bytes are short.
    pub fn value(&self, extra: &[u8]) -> Option<f64> {
        let width = scalar_width(self.data_type)?;
        let raw = extra.get(self.start..self.start + width)?;
        let v = match self.data_type {
            1 => raw[0] as f64,
            2 => raw[0] as i8 as f64,
            3 => u16::from_le_bytes(raw.try_into().ok()?) as f64,
            4 => i16::from_le_bytes(raw.try_into().ok()?) as f64,
            5 => u32::from_le_bytes(raw.try_into().ok()?) as f64,
            6 => i32::from_le_bytes(raw.try_into().ok()?) as f64,
            7 => u64::from_le_bytes(raw.try_into().ok()?) as f64,
            8 => i64::from_le_bytes(raw.try_into().ok()?) as f64,
            9 => f32::from_le_bytes(raw.try_into().ok()?) as f64,
            10 => f64::from_le_bytes(raw.try_into().ok()?),
            _ => return None,
        };
        Some(v * self.scale + self.offset)
    }
}

fn scalar_width(data_type: u8) -> Option<usize> {
    match data_type {
        1 | 2 => Some(1),
        3 | 4 => Some(2),
        5 | 6 | 9 => Some(4),
        7 | 8 | 10 => Some(8),
        _ => None,
    }
}

/// Bytes a descriptor occupies in the point record, including the
/// deprecated two- and three-element array types.
fn stored_width(data_type: u8, options: u8) -> usize {
    match data_type {
        0 => options as usize,
        1..=10 => scalar_width(data_type).unwrap_or(0),
        11..=30 => {
            let base = (data_type - 1) % 10 + 1;
            let count = ((data_type - 1) / 10 + 1) as usize;
            scalar_width(base).unwrap_or(0) * count
        }
        _ => 0,
    }
}

fn first_f64(bytes: &[u8]) -> f64 {
    bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .map(f64::from_le_bytes)
        .unwrap_or(0.0)
}

/// Attributes declared by the extra-bytes records in `vlrs`.
pub fn extra_bytes_fields<'a>(vlrs: impl IntoIterator<Item = &'a Vlr>) -> Vec<ExtraBytesField> {
    let mut fields = Vec::new();
    let mut start = 0;
    let records = vlrs.into_iter().filter(|v| {
        v.user_id.trim_end_matches('\0') == SPEC_USER_ID && v.record_id == EXTRA_BYTES_RECORD_ID
    });
    for record in records {
        for d in record.data.chunks_exact(DESCRIPTOR_LEN) {
            let (data_type, options) = (d[2], d[3]);
            let name = String::from_utf8_lossy(&d[4..36])
                .trim_end_matches('\0')
                .trim()
                .to_string();
            let scale = if options & OPTION_SCALE != 0 {
                first_f64(&d[112..136])
            } else {
                1.0
            };
            let offset = if options & OPTION_OFFSET != 0 {
                first_f64(&d[136..160])
            } else {
                0.0
            };
            fields.push(ExtraBytesField {
                name,
                start,
                data_type,
                scale,
                offset,
            });
            start += stored_width(data_type, options);
        }
    }
    fields
}
