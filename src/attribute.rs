//! Decoded attribute values, materialized by the attribute message handler
//! (§4.5) once its datatype/dataspace sub-messages and bytes are known.

use crate::dataset::Datatype;

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    SignedInts(Vec<i64>),
    UnsignedInts(Vec<u64>),
    Floats(Vec<f64>),
    Raw(Vec<u8>),
}

impl AttributeValue {
    pub fn decode(datatype: Datatype, signed: bool, type_size: u64, bytes: &[u8]) -> Self {
        match datatype {
            Datatype::String => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                match std::str::from_utf8(&bytes[..end]) {
                    Ok(text) => AttributeValue::Text(text.to_string()),
                    Err(_) => AttributeValue::Raw(bytes.to_vec()),
                }
            }
            Datatype::FixedPoint => {
                let count = if type_size == 0 { 0 } else { bytes.len() / type_size as usize };
                if signed {
                    AttributeValue::SignedInts((0..count).map(|i| {
                        read_signed(&bytes[i * type_size as usize..(i + 1) * type_size as usize])
                    }).collect())
                } else {
                    AttributeValue::UnsignedInts((0..count).map(|i| {
                        read_unsigned(&bytes[i * type_size as usize..(i + 1) * type_size as usize])
                    }).collect())
                }
            }
            Datatype::FloatingPoint => {
                let count = if type_size == 0 { 0 } else { bytes.len() / type_size as usize };
                AttributeValue::Floats((0..count).map(|i| {
                    let chunk = &bytes[i * type_size as usize..(i + 1) * type_size as usize];
                    if type_size == 4 {
                        f32::from_le_bytes(chunk.try_into().unwrap()) as f64
                    } else {
                        f64::from_le_bytes(chunk.try_into().unwrap_or([0; 8]))
                    }
                }).collect())
            }
        }
    }
}

fn read_unsigned(bytes: &[u8]) -> u64 {
    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate() {
        value |= (*byte as u64) << (8 * i);
    }
    value
}

fn read_signed(bytes: &[u8]) -> i64 {
    let unsigned = read_unsigned(bytes);
    let bits = bytes.len() * 8;
    if bits == 0 || bits >= 64 {
        return unsigned as i64;
    }
    let shift = 64 - bits;
    ((unsigned << shift) as i64) >> shift
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_signed_negative_value() {
        let bytes = (-5i32).to_le_bytes();
        let value = AttributeValue::decode(Datatype::FixedPoint, true, 4, &bytes);
        assert_eq!(value, AttributeValue::SignedInts(vec![-5]));
    }

    #[test]
    fn decodes_nul_terminated_text() {
        let mut bytes = b"meters".to_vec();
        bytes.push(0);
        let value = AttributeValue::decode(Datatype::String, true, 1, &bytes);
        assert_eq!(value, AttributeValue::Text("meters".to_string()));
    }

    #[test]
    fn decodes_f64_array() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f64.to_le_bytes());
        bytes.extend_from_slice(&2.5f64.to_le_bytes());
        let value = AttributeValue::decode(Datatype::FloatingPoint, false, 8, &bytes);
        assert_eq!(value, AttributeValue::Floats(vec![1.5, 2.5]));
    }
}
