//! Text-format array literal codec.
//!
//! Arrays travel as `{elem,elem,...}`: elements are bare or double-quoted,
//! quoting guards the delimiter, braces, quotes, backslashes and leading or
//! trailing whitespace, and `\"`/`\\` are the only escapes that collapse.
//! One dimension only.
//!
//! <https://www.postgresql.org/docs/current/arrays.html#ARRAYS-IO>
use crate::{
    connection::SessionParams,
    encode,
    error::{DecodeError, EncodeError},
    oid::{self, Kind, Oid},
    value::{Array, Value},
};

enum State {
    Ready,
    Backslash,
    QuoteOpened,
    Done,
}

/// Split an array literal into its element byte strings.
fn tokenize(s: &[u8], delimiter: u8) -> Result<Vec<Vec<u8>>, DecodeError> {
    let malformed = |why: &str| DecodeError::Array(format!("{why}: {:?}", String::from_utf8_lossy(s)));

    if s.len() < 2 {
        return Err(malformed("too short"));
    }
    if s[0] != b'{' {
        return Err(malformed("should start with '{'"));
    }
    if s[s.len() - 1] != b'}' {
        return Err(malformed("should end with '}'"));
    }

    let mut state = State::Ready;
    let mut tokens: Vec<Vec<u8>> = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for &c in s {
        match state {
            State::Ready => match c {
                b'{' => {}
                b' ' => {}
                b'"' => state = State::QuoteOpened,
                b'}' => {
                    // the empty array has no element to flush
                    if s.len() > 2 {
                        tokens.push(std::mem::take(&mut current));
                    }
                    state = State::Done;
                }
                c if c == delimiter => {
                    tokens.push(std::mem::take(&mut current));
                }
                c => current.push(c),
            },
            State::Backslash => match c {
                b'"' | b'\\' => {
                    current.push(c);
                    state = State::QuoteOpened;
                }
                c => {
                    current.push(b'\\');
                    current.push(c);
                    state = State::QuoteOpened;
                }
            },
            State::QuoteOpened => match c {
                b'\\' => state = State::Backslash,
                b'"' => state = State::Ready,
                c => current.push(c),
            },
            State::Done => return Err(malformed("data after closing '}'")),
        }
    }

    match state {
        State::Done => Ok(tokens),
        _ => Err(malformed("unterminated")),
    }
}

/// Decode an array literal into the [`Array`] variant matching the element
/// OID's native kind.
pub(crate) fn decode(s: &[u8], typ: Oid) -> Result<Value, DecodeError> {
    let element_typ = oid::element_of(typ)
        .ok_or_else(|| DecodeError::Array(format!("no element type for oid {typ}")))?;
    let tokens = tokenize(s, oid::delimiter(element_typ))?;

    macro_rules! collect {
        ($variant:ident, $want:ident($v:pat) => $item:expr) => {{
            let mut elements = Vec::with_capacity(tokens.len());
            for token in &tokens {
                match encode::decode(token, element_typ)? {
                    Value::$want($v) => elements.push($item),
                    _ => return Err(DecodeError::OutOfRange),
                }
            }
            Array::$variant(elements)
        }};
    }

    let array = match oid::kind(element_typ) {
        Some(Kind::Bool) => collect!(Bool, Bool(v) => v),
        Some(Kind::Int2) => collect!(Int2, Int(v) => i16::try_from(v).map_err(|_| DecodeError::OutOfRange)?),
        Some(Kind::Int4) => collect!(Int4, Int(v) => i32::try_from(v).map_err(|_| DecodeError::OutOfRange)?),
        Some(Kind::Int8) => collect!(Int8, Int(v) => v),
        Some(Kind::Float4) => collect!(Float4, Float4(v) => v),
        Some(Kind::Float8) => collect!(Float8, Float8(v) => v),
        Some(Kind::Text) => collect!(Text, Text(v) => v),
        Some(Kind::Timestamp) => collect!(Timestamp, Timestamp(v) => v),
        None => {
            // no native kind: element decode either yields bytes (bytea,
            // unrecognized oids) or something this array cannot hold, in
            // which case the raw token is kept
            let mut elements = Vec::with_capacity(tokens.len());
            for token in tokens {
                match encode::decode(&token, element_typ)? {
                    Value::Bytes(b) => elements.push(b),
                    _ => elements.push(token),
                }
            }
            Array::Bytes(elements)
        }
    };

    Ok(Value::Array(array))
}

/// Encode an [`Array`] value as a literal for the target array OID.
pub(crate) fn encode(
    session: &SessionParams,
    array: &Array,
    typ: Oid,
) -> Result<Vec<u8>, EncodeError> {
    let Some(element_typ) = oid::element_of(typ) else {
        return Err(EncodeError::UnknownType("array"));
    };
    let delimiter = oid::delimiter(element_typ);
    let string_element = oid::category(element_typ) == oid::Category::String;

    let mut out = Vec::with_capacity(2 + array.len() * 3);
    out.push(b'{');

    macro_rules! join {
        ($elements:expr, $elem:pat => $value:expr) => {
            for (i, $elem) in $elements.iter().enumerate() {
                if i > 0 {
                    out.push(delimiter);
                }
                let value = $value;
                out.extend_from_slice(&encode::encode(session, &value, element_typ)?);
            }
        };
    }

    match array {
        Array::Text(elements) => {
            for (i, s) in elements.iter().enumerate() {
                if i > 0 {
                    out.push(delimiter);
                }
                if string_element {
                    out.extend_from_slice(&encode_string(s, delimiter));
                } else {
                    out.extend_from_slice(&encode::encode(
                        session,
                        &Value::Text(s.clone()),
                        element_typ,
                    )?);
                }
            }
        }
        _ if string_element => return Err(EncodeError::UnknownType("non-string array")),
        Array::Bool(elements) => join!(elements, v => Value::Bool(*v)),
        Array::Int2(elements) => join!(elements, v => Value::Int((*v).into())),
        Array::Int4(elements) => join!(elements, v => Value::Int((*v).into())),
        Array::Int8(elements) => join!(elements, v => Value::Int(*v)),
        Array::Float4(elements) => join!(elements, v => Value::Float4(*v)),
        Array::Float8(elements) => join!(elements, v => Value::Float8(*v)),
        Array::Timestamp(elements) => join!(elements, v => Value::Timestamp(*v)),
        Array::Bytes(elements) => join!(elements, v => Value::Bytes(v.clone())),
    }

    out.push(b'}');
    Ok(out)
}

/// Quote one string element when the literal rules require it.
fn encode_string(s: &str, delimiter: u8) -> Vec<u8> {
    if s.is_empty() {
        return b"\"\"".to_vec();
    }
    if s == "NULL" {
        return b"\"NULL\"".to_vec();
    }

    let first = s.chars().next();
    let last = s.chars().next_back();
    let needs_quoting = first.is_some_and(char::is_whitespace)
        || last.is_some_and(char::is_whitespace)
        || s.bytes().any(|b| b == b'"' || b == b'\\' || b == delimiter);

    if !needs_quoting {
        return s.as_bytes().to_vec();
    }

    let mut quoted = Vec::with_capacity(s.len() + 3);
    quoted.push(b'"');
    for b in s.bytes() {
        if b == b'"' || b == b'\\' {
            quoted.push(b'\\');
        }
        quoted.push(b);
    }
    quoted.push(b'"');
    quoted
}

#[cfg(test)]
mod test {
    use super::*;

    fn session() -> SessionParams {
        SessionParams { server_version: 90200, time_zone: None }
    }

    fn decode_ok(s: &[u8], typ: Oid) -> Array {
        match decode(s, typ).unwrap() {
            Value::Array(a) => a,
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn decode_quoted_and_bare() {
        let a = decode_ok(br#"{"A",B,"Last word \"quoted\""}"#, oid::VARCHAR_ARRAY);
        assert_eq!(
            a,
            Array::Text(vec!["A".into(), "B".into(), "Last word \"quoted\"".into()]),
        );
    }

    #[test]
    fn decode_empty() {
        assert_eq!(decode_ok(b"{}", oid::INT4_ARRAY), Array::Int4(vec![]));
    }

    #[test]
    fn decode_scalars() {
        assert_eq!(decode_ok(b"{1,2,3}", oid::INT2_ARRAY), Array::Int2(vec![1, 2, 3]));
        assert_eq!(decode_ok(b"{-1,0,1}", oid::INT4_ARRAY), Array::Int4(vec![-1, 0, 1]));
        assert_eq!(decode_ok(b"{9000000000}", oid::INT8_ARRAY), Array::Int8(vec![9_000_000_000]));
        assert_eq!(decode_ok(b"{t,f}", oid::BOOL_ARRAY), Array::Bool(vec![true, false]));
        assert_eq!(decode_ok(b"{1.5,-2}", oid::FLOAT8_ARRAY), Array::Float8(vec![1.5, -2.0]));
    }

    #[test]
    fn decode_int2_overflow() {
        assert!(decode(b"{40000}", oid::INT2_ARRAY).is_err());
    }

    #[test]
    fn decode_quoted_null_is_text() {
        let a = decode_ok(br#"{NULL,"NULL"}"#, oid::TEXT_ARRAY);
        assert_eq!(a, Array::Text(vec!["NULL".into(), "NULL".into()]));
    }

    #[test]
    fn decode_escapes_pass_through() {
        let a = decode_ok(br#"{"a\nb"}"#, oid::TEXT_ARRAY);
        assert_eq!(a, Array::Text(vec!["a\\nb".into()]));
    }

    #[test]
    fn decode_bytea_elements() {
        let a = decode_ok(br#"{"\\x6162"}"#, oid::BYTEA_ARRAY);
        assert_eq!(a, Array::Bytes(vec![b"ab".to_vec()]));
    }

    #[test]
    fn decode_box_delimiter() {
        let a = decode_ok(b"{(2,3),(1,2);(6,5),(4,3)}", oid::BOX_ARRAY);
        assert_eq!(a, Array::Bytes(vec![b"(2,3),(1,2)".to_vec(), b"(6,5),(4,3)".to_vec()]));
    }

    #[test]
    fn decode_malformed() {
        for input in [
            &b"1,2}"[..],
            b"{1,2",
            b"{",
            b"",
            b"{}x",
        ] {
            assert!(decode(input, oid::INT4_ARRAY).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn encode_strings() {
        let s = session();
        let a = Array::Text(vec![
            "plain".into(),
            "".into(),
            "NULL".into(),
            "with space".into(),
            "q\"uote".into(),
            " lead".into(),
        ]);
        let got = encode(&s, &a, oid::TEXT_ARRAY).unwrap();
        assert_eq!(
            got,
            br#"{plain,"","NULL",with space,"q\"uote"," lead"}"#.to_vec(),
        );
    }

    #[test]
    fn encode_scalars() {
        let s = session();
        assert_eq!(encode(&s, &Array::Int4(vec![1, 2, 3]), oid::INT4_ARRAY).unwrap(), b"{1,2,3}");
        assert_eq!(encode(&s, &Array::Bool(vec![true, false]), oid::BOOL_ARRAY).unwrap(), b"{true,false}");
        assert_eq!(encode(&s, &Array::Int4(vec![]), oid::INT4_ARRAY).unwrap(), b"{}");
    }

    #[test]
    fn round_trip() {
        let s = session();
        let cases: Vec<(Array, Oid)> = vec![
            (Array::Int2(vec![-3, 0, 3]), oid::INT2_ARRAY),
            (Array::Int4(vec![1, -2, 3]), oid::INT4_ARRAY),
            (Array::Int8(vec![i64::MIN, i64::MAX]), oid::INT8_ARRAY),
            (Array::Bool(vec![true, false, true]), oid::BOOL_ARRAY),
            (Array::Float8(vec![1.5, -0.25]), oid::FLOAT8_ARRAY),
            // bare elements lose interior whitespace on the way back in, so
            // round-trippable strings either quote or stay space-free
            (
                Array::Text(vec!["ab".into(), "".into(), "NULL".into(), "\\ and \"".into(), " a b ".into(), "a,b".into()]),
                oid::TEXT_ARRAY,
            ),
        ];
        for (array, typ) in cases {
            let encoded = encode(&s, &array, typ).unwrap();
            assert_eq!(decode_ok(&encoded, typ), array, "literal {:?}", String::from_utf8_lossy(&encoded));
        }
    }
}
