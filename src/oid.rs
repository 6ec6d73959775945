//! Object identifiers from the `pg_type` catalog.
//!
//! The tables below are baked in from the catalog for OIDs below 10000:
//! per-OID category, the OID of the array-of-this-type, the element OID of
//! container types, and the native kind the text codec decodes into.
//! Everything here is constant data; unrecognized OIDs fall through to
//! [`Category::Unknown`] and decode as opaque bytes.
//!
//! <https://www.postgresql.org/docs/current/catalog-pg-type.html>

/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// The `typcategory` classifier of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Array,
    Boolean,
    Composite,
    DateTime,
    Enum,
    Geometric,
    NetworkAddress,
    Numeric,
    Pseudo,
    Range,
    String,
    Timespan,
    UserDefined,
    BitString,
    Unknown,
}

/// Native runtime kind a text value decodes into.
///
/// Types without a kind decode as raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
    Timestamp,
}

macro_rules! registry {
    ($(
        $name:ident = $oid:literal : $cat:ident
        $(, elem $elem:ident)? $(, array $arr:ident)? $(, kind $kind:ident)? ;
    )*) => {
        $( pub const $name: Oid = $oid; )*

        /// Category of a type; [`Category::Unknown`] for unrecognized OIDs.
        pub fn category(oid: Oid) -> Category {
            match oid {
                $( $name => Category::$cat, )*
                _ => Category::Unknown,
            }
        }

        /// The OID of the array type whose elements are `oid`.
        pub fn array_of(oid: Oid) -> Option<Oid> {
            match oid {
                $( $( $name => Some($arr), )? )*
                _ => None,
            }
        }

        /// The element OID of a container type.
        pub fn element_of(oid: Oid) -> Option<Oid> {
            match oid {
                $( $( $name => Some($elem), )? )*
                _ => None,
            }
        }

        /// Native kind of a type, when the codec has one.
        pub fn kind(oid: Oid) -> Option<Kind> {
            match oid {
                $( $( $name => Some(Kind::$kind), )? )*
                _ => None,
            }
        }

        #[cfg(test)]
        const ALL: &[Oid] = &[$($name),*];
    };
}

registry! {
    BOOL = 16: Boolean, array BOOL_ARRAY, kind Bool;
    BYTEA = 17: UserDefined, array BYTEA_ARRAY;
    CHAR = 18: String, array CHAR_ARRAY, kind Text;
    NAME = 19: String, elem CHAR, array NAME_ARRAY;
    INT8 = 20: Numeric, array INT8_ARRAY, kind Int8;
    INT2 = 21: Numeric, array INT2_ARRAY, kind Int2;
    INT2VECTOR = 22: Array, elem INT2, array INT2VECTOR_ARRAY;
    INT4 = 23: Numeric, array INT4_ARRAY, kind Int4;
    REGPROC = 24: Numeric, array REGPROC_ARRAY;
    TEXT = 25: String, array TEXT_ARRAY, kind Text;
    OID = 26: Numeric, array OID_ARRAY;
    TID = 27: UserDefined, array TID_ARRAY;
    XID = 28: UserDefined, array XID_ARRAY;
    CID = 29: UserDefined, array CID_ARRAY;
    OIDVECTOR = 30: Array, elem OID, array OIDVECTOR_ARRAY;
    PG_TYPE = 71: Composite;
    PG_ATTRIBUTE = 75: Composite;
    PG_PROC = 81: Composite;
    PG_CLASS = 83: Composite;
    JSON = 114: UserDefined, array JSON_ARRAY;
    XML = 142: UserDefined, array XML_ARRAY;
    XML_ARRAY = 143: Array, elem XML;
    PG_NODE_TREE = 194: String;
    JSON_ARRAY = 199: Array, elem JSON;
    SMGR = 210: UserDefined;
    POINT = 600: Geometric, elem FLOAT8, array POINT_ARRAY;
    LSEG = 601: Geometric, elem POINT, array LSEG_ARRAY;
    PATH = 602: Geometric, array PATH_ARRAY;
    BOX = 603: Geometric, elem POINT, array BOX_ARRAY;
    POLYGON = 604: Geometric, array POLYGON_ARRAY;
    LINE = 628: Geometric, elem FLOAT8, array LINE_ARRAY;
    LINE_ARRAY = 629: Array, elem LINE;
    CIDR = 650: NetworkAddress, array CIDR_ARRAY;
    CIDR_ARRAY = 651: Array, elem CIDR;
    FLOAT4 = 700: Numeric, array FLOAT4_ARRAY, kind Float4;
    FLOAT8 = 701: Numeric, array FLOAT8_ARRAY, kind Float8;
    ABSTIME = 702: DateTime, array ABSTIME_ARRAY;
    RELTIME = 703: Timespan, array RELTIME_ARRAY;
    TINTERVAL = 704: Timespan, array TINTERVAL_ARRAY;
    UNKNOWN = 705: Unknown;
    CIRCLE = 718: Geometric, array CIRCLE_ARRAY;
    CIRCLE_ARRAY = 719: Array, elem CIRCLE;
    MONEY = 790: Numeric, array MONEY_ARRAY;
    MONEY_ARRAY = 791: Array, elem MONEY;
    MACADDR = 829: UserDefined, array MACADDR_ARRAY;
    INET = 869: NetworkAddress, array INET_ARRAY;
    BOOL_ARRAY = 1000: Array, elem BOOL;
    BYTEA_ARRAY = 1001: Array, elem BYTEA;
    CHAR_ARRAY = 1002: Array, elem CHAR;
    NAME_ARRAY = 1003: Array, elem NAME;
    INT2_ARRAY = 1005: Array, elem INT2;
    INT2VECTOR_ARRAY = 1006: Array, elem INT2VECTOR;
    INT4_ARRAY = 1007: Array, elem INT4;
    REGPROC_ARRAY = 1008: Array, elem REGPROC;
    TEXT_ARRAY = 1009: Array, elem TEXT;
    TID_ARRAY = 1010: Array, elem TID;
    XID_ARRAY = 1011: Array, elem XID;
    CID_ARRAY = 1012: Array, elem CID;
    OIDVECTOR_ARRAY = 1013: Array, elem OIDVECTOR;
    BPCHAR_ARRAY = 1014: Array, elem BPCHAR;
    VARCHAR_ARRAY = 1015: Array, elem VARCHAR;
    INT8_ARRAY = 1016: Array, elem INT8;
    POINT_ARRAY = 1017: Array, elem POINT;
    LSEG_ARRAY = 1018: Array, elem LSEG;
    PATH_ARRAY = 1019: Array, elem PATH;
    BOX_ARRAY = 1020: Array, elem BOX;
    FLOAT4_ARRAY = 1021: Array, elem FLOAT4;
    FLOAT8_ARRAY = 1022: Array, elem FLOAT8;
    ABSTIME_ARRAY = 1023: Array, elem ABSTIME;
    RELTIME_ARRAY = 1024: Array, elem RELTIME;
    TINTERVAL_ARRAY = 1025: Array, elem TINTERVAL;
    POLYGON_ARRAY = 1027: Array, elem POLYGON;
    OID_ARRAY = 1028: Array, elem OID;
    ACLITEM = 1033: UserDefined, array ACLITEM_ARRAY;
    ACLITEM_ARRAY = 1034: Array, elem ACLITEM;
    MACADDR_ARRAY = 1040: Array, elem MACADDR;
    INET_ARRAY = 1041: Array, elem INET;
    BPCHAR = 1042: String, array BPCHAR_ARRAY, kind Text;
    VARCHAR = 1043: String, array VARCHAR_ARRAY, kind Text;
    DATE = 1082: DateTime, array DATE_ARRAY, kind Timestamp;
    TIME = 1083: DateTime, array TIME_ARRAY, kind Timestamp;
    TIMESTAMP = 1114: DateTime, array TIMESTAMP_ARRAY, kind Timestamp;
    TIMESTAMP_ARRAY = 1115: Array, elem TIMESTAMP;
    DATE_ARRAY = 1182: Array, elem DATE;
    TIME_ARRAY = 1183: Array, elem TIME;
    TIMESTAMPTZ = 1184: DateTime, array TIMESTAMPTZ_ARRAY, kind Timestamp;
    TIMESTAMPTZ_ARRAY = 1185: Array, elem TIMESTAMPTZ;
    INTERVAL = 1186: Timespan, array INTERVAL_ARRAY;
    INTERVAL_ARRAY = 1187: Array, elem INTERVAL;
    NUMERIC_ARRAY = 1231: Array, elem NUMERIC;
    PG_DATABASE = 1248: Composite;
    CSTRING_ARRAY = 1263: Array, elem CSTRING;
    TIMETZ = 1266: DateTime, array TIMETZ_ARRAY, kind Timestamp;
    TIMETZ_ARRAY = 1270: Array, elem TIMETZ;
    BIT = 1560: BitString, array BIT_ARRAY;
    BIT_ARRAY = 1561: Array, elem BIT;
    VARBIT = 1562: BitString, array VARBIT_ARRAY;
    VARBIT_ARRAY = 1563: Array, elem VARBIT;
    NUMERIC = 1700: Numeric, array NUMERIC_ARRAY;
    REFCURSOR = 1790: UserDefined, array REFCURSOR_ARRAY;
    REFCURSOR_ARRAY = 2201: Array, elem REFCURSOR;
    REGPROCEDURE = 2202: Numeric, array REGPROCEDURE_ARRAY;
    REGOPER = 2203: Numeric, array REGOPER_ARRAY;
    REGOPERATOR = 2204: Numeric, array REGOPERATOR_ARRAY;
    REGCLASS = 2205: Numeric, array REGCLASS_ARRAY;
    REGTYPE = 2206: Numeric, array REGTYPE_ARRAY;
    REGPROCEDURE_ARRAY = 2207: Array, elem REGPROCEDURE;
    REGOPER_ARRAY = 2208: Array, elem REGOPER;
    REGOPERATOR_ARRAY = 2209: Array, elem REGOPERATOR;
    REGCLASS_ARRAY = 2210: Array, elem REGCLASS;
    REGTYPE_ARRAY = 2211: Array, elem REGTYPE;
    RECORD = 2249: Pseudo, array RECORD_ARRAY;
    CSTRING = 2275: Pseudo, array CSTRING_ARRAY;
    ANY = 2276: Pseudo;
    ANYARRAY = 2277: Pseudo;
    VOID = 2278: Pseudo;
    TRIGGER = 2279: Pseudo;
    LANGUAGE_HANDLER = 2280: Pseudo;
    INTERNAL = 2281: Pseudo;
    OPAQUE = 2282: Pseudo;
    ANYELEMENT = 2283: Pseudo;
    RECORD_ARRAY = 2287: Pseudo, elem RECORD;
    ANYNONARRAY = 2776: Pseudo;
    PG_AUTHID = 2842: Composite;
    PG_AUTH_MEMBERS = 2843: Composite;
    TXID_SNAPSHOT_ARRAY = 2949: Array, elem TXID_SNAPSHOT;
    UUID = 2950: UserDefined, array UUID_ARRAY;
    UUID_ARRAY = 2951: Array, elem UUID;
    TXID_SNAPSHOT = 2970: UserDefined, array TXID_SNAPSHOT_ARRAY;
    FDW_HANDLER = 3115: Pseudo;
    ANYENUM = 3500: Pseudo;
    TSVECTOR = 3614: UserDefined, array TSVECTOR_ARRAY;
    TSQUERY = 3615: UserDefined, array TSQUERY_ARRAY;
    GTSVECTOR = 3642: UserDefined, array GTSVECTOR_ARRAY;
    TSVECTOR_ARRAY = 3643: Array, elem TSVECTOR;
    GTSVECTOR_ARRAY = 3644: Array, elem GTSVECTOR;
    TSQUERY_ARRAY = 3645: Array, elem TSQUERY;
    REGCONFIG = 3734: Numeric, array REGCONFIG_ARRAY;
    REGCONFIG_ARRAY = 3735: Array, elem REGCONFIG;
    REGDICTIONARY = 3769: Numeric, array REGDICTIONARY_ARRAY;
    REGDICTIONARY_ARRAY = 3770: Array, elem REGDICTIONARY;
    ANYRANGE = 3831: Pseudo;
    INT4RANGE = 3904: Range, array INT4RANGE_ARRAY;
    INT4RANGE_ARRAY = 3905: Array, elem INT4RANGE;
    NUMRANGE = 3906: Range, array NUMRANGE_ARRAY;
    NUMRANGE_ARRAY = 3907: Array, elem NUMRANGE;
    TSRANGE = 3908: Range, array TSRANGE_ARRAY;
    TSRANGE_ARRAY = 3909: Array, elem TSRANGE;
    TSTZRANGE = 3910: Range, array TSTZRANGE_ARRAY;
    TSTZRANGE_ARRAY = 3911: Array, elem TSTZRANGE;
    DATERANGE = 3912: Range, array DATERANGE_ARRAY;
    DATERANGE_ARRAY = 3913: Array, elem DATERANGE;
    INT8RANGE = 3926: Range, array INT8RANGE_ARRAY;
    INT8RANGE_ARRAY = 3927: Array, elem INT8RANGE;
}

/// Whether values of this type are text-format array literals.
pub fn is_array(oid: Oid) -> bool {
    category(oid) == Category::Array
}

/// Delimiter between elements in a text-format array literal.
///
/// `box` is the one catalog type that separates with `;`.
pub fn delimiter(oid: Oid) -> u8 {
    if oid == BOX {
        return b';';
    }
    b','
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn array_element_involution() {
        for &oid in ALL {
            if !is_array(oid) {
                continue;
            }
            let elem = element_of(oid).unwrap();
            let arr = array_of(elem).unwrap();
            assert_eq!(element_of(arr), Some(elem), "oid {oid}");
        }
    }

    #[test]
    fn element_array_inverse() {
        for &oid in ALL {
            if is_array(oid) {
                continue;
            }
            let Some(arr) = array_of(oid) else { continue };
            assert_eq!(element_of(arr), Some(oid), "oid {oid}");
            // `_record` keeps the pseudo category in pg_type; every other
            // array type is category A.
            assert!(is_array(arr) || arr == RECORD_ARRAY, "oid {oid}");
        }
    }

    #[test]
    fn delimiters() {
        assert_eq!(delimiter(BOX), b';');
        assert_eq!(delimiter(INT4), b',');
        assert_eq!(delimiter(TEXT), b',');
    }

    #[test]
    fn kinds() {
        assert_eq!(kind(BOOL), Some(Kind::Bool));
        assert_eq!(kind(INT2), Some(Kind::Int2));
        assert_eq!(kind(INT4), Some(Kind::Int4));
        assert_eq!(kind(INT8), Some(Kind::Int8));
        assert_eq!(kind(FLOAT4), Some(Kind::Float4));
        assert_eq!(kind(FLOAT8), Some(Kind::Float8));
        assert_eq!(kind(VARCHAR), Some(Kind::Text));
        assert_eq!(kind(TIMESTAMPTZ), Some(Kind::Timestamp));
        assert_eq!(kind(BYTEA), None);
        assert_eq!(kind(999_999), None);
    }

    #[test]
    fn unknown_oid() {
        assert_eq!(category(999_999), Category::Unknown);
        assert_eq!(array_of(999_999), None);
        assert_eq!(element_of(999_999), None);
    }
}
