use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::date::Timestamp;
use crate::error::Result;
use crate::{errdata, errinput};

/// The kind of a platform account. Byte values are part of the disk
/// encoding and must not change.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum AccountKind {
    User = 0,
    Organization = 1,
    Bot = 2,
}

impl AccountKind {
    pub fn name(self) -> &'static str {
        match self {
            AccountKind::User => "User",
            AccountKind::Organization => "Organization",
            AccountKind::Bot => "Bot",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "User" => Ok(AccountKind::User),
            "Organization" => Ok(AccountKind::Organization),
            "Bot" => Ok(AccountKind::Bot),
            _ => errinput!("unknown account kind {s:?}"),
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(AccountKind::User),
            1 => Ok(AccountKind::Organization),
            2 => Ok(AccountKind::Bot),
            _ => errdata!("invalid account kind byte {b}"),
        }
    }
}

/// The closed set of field types a record can be made of.
///
/// | Kind     | Text form                   | Binary form            |
/// |----------|-----------------------------|------------------------|
/// | Bool     | `True` / `False`            | 1 byte                 |
/// | Kind     | `User`/`Organization`/`Bot` | 1 byte                 |
/// | Int      | decimal, non-negative       | u32, big-endian        |
/// | Double   | (none)                      | f64, big-endian        |
/// | Str      | non-empty text              | *len* bytes            |
/// | StrNull  | possibly empty text         | *len* bytes            |
/// | IntList  | `[a, b, c]`                 | 4·*len* bytes          |
/// | Date     | `YYYY-MM-DD`                | (none)                 |
/// | DateTime | `YYYY-MM-DD HH:MM:SS`       | packed u32, big-endian |
///
/// Variable-size kinds take their binary length from a paired length
/// field that precedes them in the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Kind,
    Int,
    Double,
    Str,
    StrNull,
    IntList,
    Date,
    DateTime,
}

impl FieldKind {
    /// Size of the binary form, or None for variable-size kinds.
    pub fn binary_size(self) -> Option<usize> {
        match self {
            FieldKind::Bool | FieldKind::Kind => Some(1),
            FieldKind::Int | FieldKind::DateTime => Some(4),
            FieldKind::Double => Some(8),
            FieldKind::Str | FieldKind::StrNull | FieldKind::IntList | FieldKind::Date => None,
        }
    }

    /// Per-element size of a variable-size kind's binary form.
    pub fn elem_size(self) -> usize {
        match self {
            FieldKind::IntList => 4,
            FieldKind::Str | FieldKind::StrNull => 1,
            _ => 0,
        }
    }
}

/// A decoded field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Kind(AccountKind),
    Int(u32),
    Double(f64),
    Str(String),
    StrNull(Option<String>),
    IntList(Vec<u32>),
    DateTime(Timestamp),
}

impl Value {
    /// Length of a list-kind value in elements.
    fn list_len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.len()),
            Value::StrNull(s) => Some(s.as_deref().map_or(0, str::len)),
            Value::IntList(l) => Some(l.len()),
            _ => None,
        }
    }
}

/// A decoded record: one `Value` per format field, in field order.
///
/// The typed accessors panic on a kind mismatch; a record is only ever
/// read through the format that produced it, so a mismatch is a bug.
#[derive(Clone, Debug, PartialEq)]
pub struct Record(pub Vec<Value>);

impl Record {
    pub fn int(&self, field: usize) -> u32 {
        match &self.0[field] {
            Value::Int(v) => *v,
            other => panic!("field {field} is {other:?}, expected Int"),
        }
    }

    pub fn boolean(&self, field: usize) -> bool {
        match &self.0[field] {
            Value::Bool(v) => *v,
            other => panic!("field {field} is {other:?}, expected Bool"),
        }
    }

    pub fn kind(&self, field: usize) -> AccountKind {
        match &self.0[field] {
            Value::Kind(v) => *v,
            other => panic!("field {field} is {other:?}, expected Kind"),
        }
    }

    pub fn double(&self, field: usize) -> f64 {
        match &self.0[field] {
            Value::Double(v) => *v,
            other => panic!("field {field} is {other:?}, expected Double"),
        }
    }

    pub fn str(&self, field: usize) -> &str {
        match &self.0[field] {
            Value::Str(v) => v,
            other => panic!("field {field} is {other:?}, expected Str"),
        }
    }

    pub fn opt_str(&self, field: usize) -> Option<&str> {
        match &self.0[field] {
            Value::StrNull(v) => v.as_deref(),
            other => panic!("field {field} is {other:?}, expected StrNull"),
        }
    }

    pub fn int_list(&self, field: usize) -> &[u32] {
        match &self.0[field] {
            Value::IntList(v) => v,
            other => panic!("field {field} is {other:?}, expected IntList"),
        }
    }

    pub fn timestamp(&self, field: usize) -> Timestamp {
        match &self.0[field] {
            Value::DateTime(v) => *v,
            other => panic!("field {field} is {other:?}, expected DateTime"),
        }
    }
}

/// Pairs a variable-size list field with the field holding its length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListPair {
    pub list: usize,
    pub length: usize,
}

/// Describes a record layout: ordered field kinds, list/length pairs and
/// the text separator. A format without a separator is binary: every
/// field is either fixed-size or preceded by its length field.
#[derive(Clone, Debug)]
pub struct Format {
    fields: Vec<FieldKind>,
    pairs: Vec<ListPair>,
    separator: Option<char>,
}

impl Format {
    pub fn text(fields: Vec<FieldKind>, pairs: Vec<ListPair>, separator: char) -> Result<Self> {
        Self::new(fields, pairs, Some(separator))
    }

    pub fn binary(fields: Vec<FieldKind>, pairs: Vec<ListPair>) -> Result<Self> {
        Self::new(fields, pairs, None)
    }

    fn new(fields: Vec<FieldKind>, pairs: Vec<ListPair>, separator: Option<char>) -> Result<Self> {
        for (i, pair) in pairs.iter().enumerate() {
            if pair.list >= fields.len() || pair.length >= fields.len() {
                return errdata!("list pair {pair:?} out of bounds");
            }
            if i > 0 && pairs[i - 1].list >= pair.list {
                return errdata!("list pairs must be ordered by list field");
            }
            if fields[pair.length] != FieldKind::Int {
                return errdata!("length field {} must be Int", pair.length);
            }
        }

        let format = Format { fields, pairs, separator };
        if format.separator.is_none() {
            for (i, kind) in format.fields.iter().enumerate() {
                match kind {
                    FieldKind::Date => return errdata!("Date has no binary form"),
                    _ if kind.binary_size().is_some() => {}
                    _ => {
                        let Some(pair) = format.pair_for(i) else {
                            return errdata!("binary field {i} has no length pair");
                        };
                        if pair.length >= i {
                            return errdata!("length field {} must precede list field {i}", pair.length);
                        }
                    }
                }
            }
        } else if format.fields.contains(&FieldKind::Double) {
            return errdata!("Double has no text form");
        }
        Ok(format)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_binary(&self) -> bool {
        self.separator.is_none()
    }

    pub fn kind_of(&self, field: usize) -> FieldKind {
        self.fields[field]
    }

    /// The list pair whose list member is `field`, if any.
    pub fn pair_for(&self, field: usize) -> Option<ListPair> {
        self.pairs.iter().find(|p| p.list == field).copied()
    }

    /// Byte offset of a field from the record start, when every earlier
    /// field is fixed-size.
    pub fn fixed_offset_of(&self, field: usize) -> Option<u64> {
        let mut offset = 0u64;
        for kind in &self.fields[..field] {
            offset += kind.binary_size()? as u64;
        }
        Some(offset)
    }

    /// Checks whether the text line parses under this format.
    pub fn validate(&self, line: &str) -> bool {
        self.parse(line).is_ok()
    }

    /// Parses a delimited text line. All-or-nothing: on any field or
    /// list-length failure no partial record is exposed.
    pub fn parse(&self, line: &str) -> Result<Record> {
        let Some(separator) = self.separator else {
            return errdata!("parse requires a text format");
        };

        let tokens: Vec<&str> = line.split(separator).collect();
        if tokens.len() != self.fields.len() {
            return errinput!("expected {} fields, found {}", self.fields.len(), tokens.len());
        }

        let mut values = Vec::with_capacity(self.fields.len());
        for (kind, token) in self.fields.iter().zip(&tokens) {
            values.push(parse_token(*kind, token)?);
        }

        for pair in &self.pairs {
            let Value::Int(expected) = &values[pair.length] else {
                return errdata!("length field {} is not Int", pair.length);
            };
            if values[pair.list].list_len() != Some(*expected as usize) {
                return errinput!("field {} does not match its declared length {expected}", pair.list);
            }
        }

        Ok(Record(values))
    }

    /// Prints the record in its text form.
    pub fn print_text(&self, record: &Record, out: &mut impl Write) -> Result<()> {
        let Some(separator) = self.separator else {
            return errdata!("print_text requires a text format");
        };
        for (i, (kind, value)) in self.fields.iter().zip(&record.0).enumerate() {
            if i > 0 {
                write!(out, "{separator}")?;
            }
            print_token(*kind, value, out)?;
        }
        Ok(())
    }

    /// Writes the record in its binary form.
    pub fn write_binary(&self, record: &Record, out: &mut impl Write) -> Result<()> {
        debug_assert!(self.is_binary());
        for pair in &self.pairs {
            let Value::Int(declared) = &record.0[pair.length] else {
                return errdata!("length field {} is not Int", pair.length);
            };
            if record.0[pair.list].list_len() != Some(*declared as usize) {
                return errdata!("field {} does not match its declared length {declared}", pair.list);
            }
        }
        let mut buf = Vec::new();
        for (kind, value) in self.fields.iter().zip(&record.0) {
            buf.clear();
            encode_field(*kind, value, &mut buf)?;
            out.write_all(&buf)?;
        }
        Ok(())
    }

    /// Reads one record in its binary form. The encoding is
    /// self-delimiting: variable-size fields consult their previously
    /// read length field.
    pub fn read_binary(&self, input: &mut impl Read) -> Result<Record> {
        debug_assert!(self.is_binary());
        let mut values: Vec<Value> = Vec::with_capacity(self.fields.len());
        for (i, kind) in self.fields.iter().enumerate() {
            let size = match kind.binary_size() {
                Some(size) => size,
                None => {
                    let pair = self.pair_for(i).expect("checked at construction");
                    let Value::Int(len) = &values[pair.length] else {
                        return errdata!("length field {} is not Int", pair.length);
                    };
                    *len as usize * kind.elem_size()
                }
            };
            let mut buf = vec![0u8; size];
            input.read_exact(&mut buf)?;
            values.push(decode_field(*kind, &buf)?);
        }
        Ok(Record(values))
    }
}

fn parse_token(kind: FieldKind, token: &str) -> Result<Value> {
    match kind {
        FieldKind::Int => {
            if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
                return errinput!("invalid integer {token:?}");
            }
            match token.parse::<u32>() {
                Ok(v) => Ok(Value::Int(v)),
                Err(_) => errinput!("integer {token:?} out of range"),
            }
        }
        FieldKind::Bool => match token {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            _ => errinput!("invalid boolean {token:?}"),
        },
        FieldKind::Kind => Ok(Value::Kind(AccountKind::parse(token)?)),
        FieldKind::Str => {
            if token.is_empty() {
                return errinput!("empty string field");
            }
            Ok(Value::Str(token.to_string()))
        }
        FieldKind::StrNull => Ok(Value::StrNull(
            (!token.is_empty()).then(|| token.to_string()),
        )),
        FieldKind::IntList => {
            let inner = token
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .ok_or_else(|| crate::error::Error::InvalidInput(format!("invalid list {token:?}")))?;
            if inner.is_empty() {
                return Ok(Value::IntList(Vec::new()));
            }
            let mut list = Vec::new();
            for item in inner.split(", ") {
                let Value::Int(v) = parse_token(FieldKind::Int, item)? else {
                    unreachable!()
                };
                list.push(v);
            }
            Ok(Value::IntList(list))
        }
        FieldKind::Date => Ok(Value::DateTime(Timestamp::parse_date(token)?)),
        FieldKind::DateTime => Ok(Value::DateTime(Timestamp::parse_datetime(token)?)),
        FieldKind::Double => errdata!("Double has no text form"),
    }
}

fn print_token(kind: FieldKind, value: &Value, out: &mut impl Write) -> Result<()> {
    match (kind, value) {
        (FieldKind::Int, Value::Int(v)) => write!(out, "{v}")?,
        (FieldKind::Bool, Value::Bool(v)) => write!(out, "{}", if *v { "True" } else { "False" })?,
        (FieldKind::Kind, Value::Kind(v)) => write!(out, "{}", v.name())?,
        (FieldKind::Str, Value::Str(s)) => write!(out, "{s}")?,
        (FieldKind::StrNull, Value::StrNull(s)) => {
            if let Some(s) = s {
                write!(out, "{s}")?;
            }
        }
        (FieldKind::IntList, Value::IntList(list)) => {
            write!(out, "[")?;
            for (i, v) in list.iter().enumerate() {
                if i > 0 {
                    write!(out, ", ")?;
                }
                write!(out, "{v}")?;
            }
            write!(out, "]")?;
        }
        (FieldKind::Date, Value::DateTime(t)) => write!(out, "{}", t.date_string())?,
        (FieldKind::DateTime, Value::DateTime(t)) => write!(out, "{t}")?,
        (kind, value) => return errdata!("cannot print {value:?} as {kind:?}"),
    }
    Ok(())
}

/// Encodes one field in its binary form, appending to `out`.
pub(crate) fn encode_field(kind: FieldKind, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match (kind, value) {
        (FieldKind::Bool, Value::Bool(v)) => out.write_u8(*v as u8)?,
        (FieldKind::Kind, Value::Kind(v)) => out.write_u8(*v as u8)?,
        (FieldKind::Int, Value::Int(v)) => out.write_u32::<BigEndian>(*v)?,
        (FieldKind::Double, Value::Double(v)) => out.write_f64::<BigEndian>(*v)?,
        (FieldKind::DateTime, Value::DateTime(t)) => out.write_u32::<BigEndian>(t.pack())?,
        (FieldKind::Str, Value::Str(s)) => out.extend_from_slice(s.as_bytes()),
        (FieldKind::StrNull, Value::StrNull(s)) => {
            if let Some(s) = s {
                out.extend_from_slice(s.as_bytes());
            }
        }
        (FieldKind::IntList, Value::IntList(list)) => {
            for v in list {
                out.write_u32::<BigEndian>(*v)?;
            }
        }
        (kind, value) => return errdata!("cannot encode {value:?} as {kind:?}"),
    }
    Ok(())
}

/// Decodes one field from its exact binary bytes.
pub(crate) fn decode_field(kind: FieldKind, mut bytes: &[u8]) -> Result<Value> {
    Ok(match kind {
        FieldKind::Bool => Value::Bool(bytes.read_u8()? != 0),
        FieldKind::Kind => Value::Kind(AccountKind::from_byte(bytes.read_u8()?)?),
        FieldKind::Int => Value::Int(bytes.read_u32::<BigEndian>()?),
        FieldKind::Double => Value::Double(bytes.read_f64::<BigEndian>()?),
        FieldKind::DateTime => Value::DateTime(Timestamp::unpack(bytes.read_u32::<BigEndian>()?)),
        FieldKind::Str => match String::from_utf8(bytes.to_vec()) {
            Ok(s) => Value::Str(s),
            Err(_) => return errdata!("string field is not valid utf-8"),
        },
        FieldKind::StrNull => {
            if bytes.is_empty() {
                Value::StrNull(None)
            } else {
                match String::from_utf8(bytes.to_vec()) {
                    Ok(s) => Value::StrNull(Some(s)),
                    Err(_) => return errdata!("string field is not valid utf-8"),
                }
            }
        }
        FieldKind::IntList => {
            let mut list = Vec::with_capacity(bytes.len() / 4);
            while !bytes.is_empty() {
                list.push(bytes.read_u32::<BigEndian>()?);
            }
            Value::IntList(list)
        }
        FieldKind::Date => return errdata!("Date has no binary form"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_text_format() -> Format {
        Format::text(
            vec![
                FieldKind::Int,
                FieldKind::Str,
                FieldKind::Kind,
                FieldKind::DateTime,
                FieldKind::Int,
                FieldKind::IntList,
                FieldKind::Bool,
                FieldKind::StrNull,
            ],
            vec![ListPair { list: 5, length: 4 }],
            ';',
        )
        .unwrap()
    }

    fn sample_binary_format() -> Format {
        Format::binary(
            vec![
                FieldKind::Int,
                FieldKind::Kind,
                FieldKind::Int,
                FieldKind::IntList,
                FieldKind::Int,
                FieldKind::Str,
                FieldKind::DateTime,
            ],
            vec![ListPair { list: 3, length: 2 }, ListPair { list: 5, length: 4 }],
        )
        .unwrap()
    }

    #[test]
    fn test_text_round_trip() {
        let format = sample_text_format();
        for line in [
            "42;somebody;User;2020-06-15 10:00:00;3;[7, 8, 9];True;a note",
            "1;x;Bot;2012-01-01 00:00:00;0;[];False;",
        ] {
            let record = format.parse(line).expect(line);
            let mut out = Vec::new();
            format.print_text(&record, &mut out).unwrap();
            assert_eq!(String::from_utf8(out).unwrap(), line);
        }
    }

    #[test]
    fn test_text_rejects_bad_fields() {
        let format = sample_text_format();
        // Wrong field count
        assert!(!format.validate("42;somebody;User"));
        // Bad kind
        assert!(!format.validate("42;somebody;Robot;2020-06-15 10:00:00;1;[7];True;"));
        // Empty Str
        assert!(!format.validate("42;;User;2020-06-15 10:00:00;1;[7];True;"));
        // Negative int
        assert!(!format.validate("-2;somebody;User;2020-06-15 10:00:00;1;[7];True;"));
        // Malformed list
        assert!(!format.validate("42;somebody;User;2020-06-15 10:00:00;2;[7,8];True;"));
        // List length mismatch
        assert!(!format.validate("42;somebody;User;2020-06-15 10:00:00;2;[7];True;"));
        // Invalid date
        assert!(!format.validate("42;somebody;User;2019-02-29 10:00:00;1;[7];True;"));
    }

    #[test]
    fn test_binary_round_trip() {
        let format = sample_binary_format();
        let record = Record(vec![
            Value::Int(7),
            Value::Kind(AccountKind::Organization),
            Value::Int(3),
            Value::IntList(vec![1, 2, 3]),
            Value::Int(5),
            Value::Str("login".into()),
            Value::DateTime(Timestamp::parse_datetime("2020-06-15 10:00:00").unwrap()),
        ]);

        let mut buf = Vec::new();
        format.write_binary(&record, &mut buf).unwrap();
        assert_eq!(buf.len(), 4 + 1 + 4 + 12 + 4 + 5 + 4);

        let decoded = format.read_binary(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_binary_scalars_are_big_endian() {
        let format = Format::binary(vec![FieldKind::Int], vec![]).unwrap();
        let mut buf = Vec::new();
        format.write_binary(&Record(vec![Value::Int(0x01020304)]), &mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_binary_length_mismatch_is_rejected() {
        let format = sample_binary_format();
        let record = Record(vec![
            Value::Int(7),
            Value::Kind(AccountKind::User),
            Value::Int(2), // declared 2, actual 3
            Value::IntList(vec![1, 2, 3]),
            Value::Int(1),
            Value::Str("x".into()),
            Value::DateTime(Timestamp::parse_datetime("2020-06-15 10:00:00").unwrap()),
        ]);
        assert!(format.write_binary(&record, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_binary_format_requires_preceding_length() {
        // List field before its length field.
        assert!(Format::binary(
            vec![FieldKind::IntList, FieldKind::Int],
            vec![ListPair { list: 0, length: 1 }],
        )
        .is_err());
        // List field with no pair at all.
        assert!(Format::binary(vec![FieldKind::Str], vec![]).is_err());
    }

    #[test]
    fn test_fixed_offset_of() {
        let format = sample_binary_format();
        assert_eq!(format.fixed_offset_of(0), Some(0));
        assert_eq!(format.fixed_offset_of(1), Some(4));
        assert_eq!(format.fixed_offset_of(2), Some(5));
        assert_eq!(format.fixed_offset_of(3), Some(9));
        // Past a variable field the offset is no longer static.
        assert_eq!(format.fixed_offset_of(4), None);
    }

    #[test]
    fn test_date_text_form() {
        let format = Format::text(vec![FieldKind::Date], vec![], ' ').unwrap();
        let record = format.parse("2020-06-15").unwrap();
        assert_eq!(record.timestamp(0).to_string(), "2020-06-15 00:00:00");
        let mut out = Vec::new();
        format.print_text(&record, &mut out).unwrap();
        assert_eq!(out, b"2020-06-15");
    }
}
