//! Text-format value codec.
//!
//! Parameters go to the backend in the text format for their target OID and
//! rows come back the same way; [`encode`] and [`decode`] are the two
//! dispatch points. Array literals live in [`crate::array`].
use chrono::SecondsFormat;

use crate::{
    array,
    connection::SessionParams,
    error::{DecodeError, EncodeError},
    oid::{self, Oid},
    timestamp::{parse_time_of_day, parse_timestamp},
    value::Value,
};

/// Encode a parameter value into the text format of the target type.
pub(crate) fn encode(
    session: &SessionParams,
    value: &Value,
    typ: Oid,
) -> Result<Vec<u8>, EncodeError> {
    match value {
        Value::Int(v) => Ok(itoa::Buffer::new().format(*v).as_bytes().to_vec()),
        Value::Float4(v) => Ok(format!("{v:.6}").into_bytes()),
        Value::Float8(v) => Ok(format!("{v}").into_bytes()),
        Value::Bool(v) => Ok(if *v { b"true".to_vec() } else { b"false".to_vec() }),
        Value::Timestamp(t) => Ok(t.to_rfc3339_opts(SecondsFormat::AutoSi, true).into_bytes()),
        Value::Bytes(b) => {
            if typ == oid::BYTEA {
                return Ok(encode_bytea(session.server_version, b));
            }
            Ok(b.clone())
        }
        Value::Text(s) => {
            if typ == oid::BYTEA {
                return Ok(encode_bytea(session.server_version, s.as_bytes()));
            }
            Ok(s.clone().into_bytes())
        }
        Value::Array(a) => array::encode(session, a, typ),
        other => Err(EncodeError::UnknownType(other.type_name())),
    }
}

/// Decode a text-format value received for the given OID.
pub(crate) fn decode(s: &[u8], typ: Oid) -> Result<Value, DecodeError> {
    if oid::is_array(typ) {
        return array::decode(s, typ);
    }

    match typ {
        oid::BYTEA => Ok(Value::Bytes(parse_bytea(s)?)),
        oid::TIMESTAMPTZ | oid::TIMESTAMP | oid::DATE => {
            Ok(Value::Timestamp(parse_timestamp(&utf8(s)?)?))
        }
        oid::TIME => Ok(Value::Timestamp(parse_time_of_day(&utf8(s)?, false)?)),
        oid::TIMETZ => Ok(Value::Timestamp(parse_time_of_day(&utf8(s)?, true)?)),
        oid::BOOL => match s.first() {
            Some(b't') => Ok(Value::Bool(true)),
            Some(b'f') => Ok(Value::Bool(false)),
            _ => Err(DecodeError::Bool),
        },
        oid::INT8 | oid::INT2 | oid::INT4 => {
            let s = utf8(s)?;
            let v = s.parse().map_err(|_| DecodeError::Int(s))?;
            Ok(Value::Int(v))
        }
        oid::FLOAT4 => {
            let s = utf8(s)?;
            let v = s.parse().map_err(|_| DecodeError::Float(s))?;
            Ok(Value::Float4(v))
        }
        oid::FLOAT8 => {
            let s = utf8(s)?;
            let v = s.parse().map_err(|_| DecodeError::Float(s))?;
            Ok(Value::Float8(v))
        }
        oid::POINT | oid::LSEG | oid::LINE | oid::BOX | oid::CIRCLE | oid::PATH | oid::POLYGON => {
            Ok(Value::Floats(extract_floats(s)?))
        }
        oid::VARCHAR | oid::CHAR | oid::BPCHAR | oid::TEXT => Ok(Value::Text(utf8(s)?)),
        _ => Ok(Value::Bytes(s.to_vec())),
    }
}

fn utf8(s: &[u8]) -> Result<String, DecodeError> {
    Ok(String::from_utf8(s.to_vec())?)
}

/// Encode a `bytea` value: the hex format once the server is known to
/// support it (9.0 and up), the legacy escape format before that.
pub(crate) fn encode_bytea(server_version: i32, v: &[u8]) -> Vec<u8> {
    if server_version >= 90000 {
        let mut result = Vec::with_capacity(2 + v.len() * 2);
        result.extend_from_slice(b"\\x");
        for b in v {
            const HEX: &[u8; 16] = b"0123456789abcdef";
            result.push(HEX[(b >> 4) as usize]);
            result.push(HEX[(b & 0xf) as usize]);
        }
        return result;
    }

    let mut result = Vec::with_capacity(v.len());
    for &b in v {
        if b == b'\\' {
            result.extend_from_slice(b"\\\\");
        } else if !(0x20..=0x7e).contains(&b) {
            result.push(b'\\');
            result.push(b'0' + (b >> 6));
            result.push(b'0' + ((b >> 3) & 0o7));
            result.push(b'0' + (b & 0o7));
        } else {
            result.push(b);
        }
    }
    result
}

/// Parse a `bytea` value received from the server. Both the hex and the
/// legacy escape format are supported.
pub(crate) fn parse_bytea(s: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if let Some(hex) = s.strip_prefix(b"\\x") {
        if hex.len() % 2 != 0 {
            return Err(DecodeError::Bytea);
        }
        let nibble = |b: u8| -> Result<u8, DecodeError> {
            match b {
                b'0'..=b'9' => Ok(b - b'0'),
                b'a'..=b'f' => Ok(b - b'a' + 10),
                b'A'..=b'F' => Ok(b - b'A' + 10),
                _ => Err(DecodeError::Bytea),
            }
        };
        let mut result = Vec::with_capacity(hex.len() / 2);
        for pair in hex.chunks_exact(2) {
            result.push(nibble(pair[0])? << 4 | nibble(pair[1])?);
        }
        return Ok(result);
    }

    let mut result = Vec::new();
    let mut s = s;
    while !s.is_empty() {
        if s[0] == b'\\' {
            if s.get(1) == Some(&b'\\') {
                result.push(b'\\');
                s = &s[2..];
                continue;
            }
            // a backslash followed by an octal number
            if s.len() < 4 {
                return Err(DecodeError::Bytea);
            }
            let mut b: u16 = 0;
            for &digit in &s[1..4] {
                if !(b'0'..=b'7').contains(&digit) {
                    return Err(DecodeError::Bytea);
                }
                b = b << 3 | (digit - b'0') as u16;
            }
            if b > 0xff {
                return Err(DecodeError::Bytea);
            }
            result.push(b as u8);
            s = &s[4..];
        } else {
            // a run of raw bytes up to the next backslash
            let i = s.iter().position(|&b| b == b'\\').unwrap_or(s.len());
            result.extend_from_slice(&s[..i]);
            s = &s[i..];
        }
    }
    Ok(result)
}

/// Pull every decimal run out of a geometric literal.
///
/// `(1,2)`, `<(1,2),3>` and friends all flatten to the float list; the
/// shape syntax itself carries no further information the driver keeps.
pub(crate) fn extract_floats(s: &[u8]) -> Result<Vec<f64>, DecodeError> {
    let mut floats = Vec::with_capacity(4);
    let mut start = 0;
    let mut in_float = false;

    for (i, &b) in s.iter().enumerate() {
        let is_float_part = b == b'.' || b == b'+' || b == b'-' || b.is_ascii_digit();

        if is_float_part && !in_float {
            start = i;
            in_float = true;
        }
        if !is_float_part && in_float {
            floats.push(parse_float(&s[start..i])?);
            in_float = false;
        }
    }
    if in_float {
        floats.push(parse_float(&s[start..])?);
    }

    Ok(floats)
}

fn parse_float(s: &[u8]) -> Result<f64, DecodeError> {
    let s = String::from_utf8(s.to_vec())?;
    s.parse().map_err(|_| DecodeError::Float(s))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Array;

    fn session(server_version: i32) -> SessionParams {
        SessionParams { server_version, time_zone: None }
    }

    #[test]
    fn encode_scalars() {
        let s = session(90200);
        let enc = |v: &Value| encode(&s, v, oid::TEXT).unwrap();
        assert_eq!(enc(&Value::Int(-42)), b"-42");
        assert_eq!(enc(&Value::Bool(true)), b"true");
        assert_eq!(enc(&Value::Bool(false)), b"false");
        assert_eq!(enc(&Value::Float4(1.5)), b"1.500000");
        assert_eq!(enc(&Value::Float8(1.5)), b"1.5");
        assert_eq!(enc(&Value::Text("foo".into())), b"foo");
    }

    #[test]
    fn encode_timestamp() {
        let s = session(90200);
        let t = parse_timestamp("2001-02-03 04:05:06.123-07").unwrap();
        assert_eq!(
            encode(&s, &Value::Timestamp(t), oid::TIMESTAMPTZ).unwrap(),
            b"2001-02-03T04:05:06.123-07:00",
        );
    }

    #[test]
    fn encode_bytea_hex() {
        // server 9.0.0 and later use the hex format
        let got = encode(&session(90000), &Value::Bytes(vec![0x00, 0x80, 0xff]), oid::BYTEA).unwrap();
        assert_eq!(got, b"\\x0080ff");
    }

    #[test]
    fn encode_bytea_escape() {
        // 8.4 still gets the escape format
        let got = encode(&session(80400), &Value::Bytes(vec![0x00, 0x80, 0xff]), oid::BYTEA).unwrap();
        assert_eq!(got, b"\\000\\200\\377");

        let got = encode(&session(80400), &Value::Bytes(b"a\\b".to_vec()), oid::BYTEA).unwrap();
        assert_eq!(got, b"a\\\\b");
    }

    #[test]
    fn encode_unknown_kind() {
        let s = session(90200);
        assert!(encode(&s, &Value::Null, oid::TEXT).is_err());
        assert!(encode(&s, &Value::Floats(vec![1.0]), oid::POINT).is_err());
    }

    #[test]
    fn bytea_round_trip() {
        let all: Vec<u8> = (0u8..=255).collect();
        for version in [80400, 90000] {
            let encoded = encode_bytea(version, &all);
            assert_eq!(parse_bytea(&encoded).unwrap(), all, "version {version}");
        }
    }

    #[test]
    fn decode_bool() {
        assert_eq!(decode(b"t", oid::BOOL).unwrap(), Value::Bool(true));
        assert_eq!(decode(b"f", oid::BOOL).unwrap(), Value::Bool(false));
        assert!(decode(b"", oid::BOOL).is_err());
    }

    #[test]
    fn decode_ints_and_floats() {
        assert_eq!(decode(b"123", oid::INT2).unwrap(), Value::Int(123));
        assert_eq!(decode(b"-7", oid::INT4).unwrap(), Value::Int(-7));
        assert_eq!(decode(b"9000000000", oid::INT8).unwrap(), Value::Int(9_000_000_000));
        assert_eq!(decode(b"1.5", oid::FLOAT4).unwrap(), Value::Float4(1.5));
        assert_eq!(decode(b"-1.25e2", oid::FLOAT8).unwrap(), Value::Float8(-125.0));
        assert!(decode(b"abc", oid::INT4).is_err());
    }

    #[test]
    fn decode_strings() {
        assert_eq!(decode(b"hello", oid::TEXT).unwrap(), Value::Text("hello".into()));
        assert_eq!(decode(b"x ", oid::BPCHAR).unwrap(), Value::Text("x ".into()));
        // unrecognized types come through as raw bytes
        assert_eq!(decode(b"1 day", oid::INTERVAL).unwrap(), Value::Bytes(b"1 day".to_vec()));
    }

    #[test]
    fn decode_geometry() {
        assert_eq!(decode(b"(1,2)", oid::POINT).unwrap(), Value::Floats(vec![1.0, 2.0]));
        assert_eq!(
            decode(b"(2.5,3),(1,2)", oid::BOX).unwrap(),
            Value::Floats(vec![2.5, 3.0, 1.0, 2.0]),
        );
        assert_eq!(
            decode(b"<(0,0),5>", oid::CIRCLE).unwrap(),
            Value::Floats(vec![0.0, 0.0, 5.0]),
        );
    }

    #[test]
    fn decode_bytea_formats() {
        assert_eq!(decode(b"\\x0080ff", oid::BYTEA).unwrap(), Value::Bytes(vec![0x00, 0x80, 0xff]));
        assert_eq!(
            decode(b"\\000\\200\\377", oid::BYTEA).unwrap(),
            Value::Bytes(vec![0x00, 0x80, 0xff]),
        );
        assert_eq!(decode(b"ab\\\\cd", oid::BYTEA).unwrap(), Value::Bytes(b"ab\\cd".to_vec()));
        assert!(decode(b"\\x008", oid::BYTEA).is_err());
        assert!(decode(b"\\09", oid::BYTEA).is_err());
    }

    #[test]
    fn decode_times() {
        let t = decode(b"04:05:06.123", oid::TIME).unwrap();
        let Value::Timestamp(t) = t else { panic!("expected timestamp") };
        assert_eq!(t.to_rfc3339_opts(SecondsFormat::Millis, true), "0000-01-01T04:05:06.123Z");

        let t = decode(b"04:05:06+09:30", oid::TIMETZ).unwrap();
        let Value::Timestamp(t) = t else { panic!("expected timestamp") };
        assert_eq!(t.offset().local_minus_utc(), 9 * 3600 + 30 * 60);
    }

    #[test]
    fn decode_array_dispatch() {
        assert_eq!(
            decode(b"{1,2,3}", oid::INT4_ARRAY).unwrap(),
            Value::Array(Array::Int4(vec![1, 2, 3])),
        );
    }
}
