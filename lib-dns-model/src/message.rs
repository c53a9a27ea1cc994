use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::name::Name;

/// Basic DNS message format, used for both queries and responses.
///
/// ```text
///     +---------------------+
///     |        Header       |
///     +---------------------+
///     |       Question      | the question for the name server
///     +---------------------+
///     |        Answer       | RRs answering the question
///     +---------------------+
///     |      Authority      | RRs pointing toward an authority
///     +---------------------+
///     |      Additional     | RRs holding additional information
///     +---------------------+
/// ```
///
/// This is the deserialised form a wire codec produces and consumes; how it
/// gets to and from octets is not this library's concern.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Message {
    pub id: u16,
    pub flags: Flags,
    pub rcode: Rcode,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
    /// EDNS version to use, `None` to not use EDNS at all.
    pub edns: Option<u8>,
}

impl Message {
    /// A fresh query for a single question, with recursion desired.
    pub fn make_query(id: u16, question: Question, edns: Option<u8>) -> Self {
        Self {
            id,
            flags: Flags {
                qr: false,
                aa: false,
                tc: false,
                rd: true,
                ra: false,
            },
            rcode: Rcode::NoError,
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns,
        }
    }

    /// An empty response to this query, copying the id and question.
    pub fn make_response(&self) -> Self {
        Self {
            id: self.id,
            flags: Flags {
                qr: true,
                aa: false,
                tc: false,
                rd: self.flags.rd,
                ra: true,
            },
            rcode: Rcode::NoError,
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: self.edns,
        }
    }

    /// The first (usually only) question.
    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }
}

/// The header flag bits this library cares about.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Flags {
    /// Whether this message is a response.
    pub qr: bool,
    /// Authoritative Answer.
    pub aa: bool,
    /// TrunCation: the message was cut to fit the transmission channel.
    pub tc: bool,
    /// Recursion Desired.
    pub rd: bool,
    /// Recursion Available.
    pub ra: bool,
}

/// The question section has a list of questions (usually 1 but possibly
/// more) being asked.  This is the structure for a single question.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Question {
    pub name: Name,
    pub rtype: RecordType,
    pub rclass: RecordClass,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.rclass, self.rtype)
    }
}

/// A single resource record from the answer, authority, or additional
/// section of a message.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ResourceRecord {
    /// The domain name this record pertains to.
    pub name: Name,
    /// The class of the data.
    pub rclass: RecordClass,
    /// How long, in seconds, the record may be cached.
    pub ttl: u32,
    /// The record data, which also determines the record type.
    pub data: RecordData,
}

impl ResourceRecord {
    pub fn rtype(&self) -> RecordType {
        self.data.rtype()
    }
}

/// A record type with its associated, deserialised, data.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordData {
    /// A 32 bit Internet address.
    A { address: Ipv4Addr },

    /// A 128 bit Internet address.
    AAAA { address: Ipv6Addr },

    /// A host which should be authoritative for the owner domain.
    NS { nsdname: Name },

    /// The canonical or primary name for the owner.  The owner name is an
    /// alias.
    CNAME { cname: Name },

    /// Like `CNAME`, but renames a whole subtree of the namespace rather
    /// than a single node.
    DNAME { target: Name },

    /// A domain name which points to some location in the domain name
    /// space; used for reverse lookups.
    PTR { ptrdname: Name },

    /// Marks the start of a zone of authority.  `minimum` doubles as the
    /// time-to-live for negative responses.
    SOA {
        mname: Name,
        rname: Name,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },

    /// A host willing to act as a mail exchange for the owner name.
    MX { preference: u16, exchange: Name },

    /// One or more character strings.
    TXT { octets: Vec<u8> },

    /// Any other record.
    Unknown {
        tag: RecordTypeUnknown,
        octets: Vec<u8>,
    },
}

impl RecordData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordData::A { .. } => RecordType::A,
            RecordData::AAAA { .. } => RecordType::AAAA,
            RecordData::NS { .. } => RecordType::NS,
            RecordData::CNAME { .. } => RecordType::CNAME,
            RecordData::DNAME { .. } => RecordType::DNAME,
            RecordData::PTR { .. } => RecordType::PTR,
            RecordData::SOA { .. } => RecordType::SOA,
            RecordData::MX { .. } => RecordType::MX,
            RecordData::TXT { .. } => RecordType::TXT,
            RecordData::Unknown { tag, .. } => RecordType::Unknown(*tag),
        }
    }
}

/// A set of records sharing an owner name, class, and type.
///
/// The TTL of the set is the minimum TTL across its members, which is what
/// expiration calculations want.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Rrset {
    pub name: Name,
    pub rtype: RecordType,
    pub rclass: RecordClass,
    pub ttl: u32,
    pub records: Vec<RecordData>,
}

impl Rrset {
    /// Collect the record set for `(name, rtype, rclass)` out of a message
    /// section, or `None` if the section has no matching records.
    pub fn find(
        section: &[ResourceRecord],
        name: &Name,
        rtype: RecordType,
        rclass: RecordClass,
    ) -> Option<Rrset> {
        let mut ttl = None;
        let mut records = Vec::new();

        for rr in section {
            if rr.name == *name && rr.rclass == rclass && rr.rtype() == rtype {
                ttl = Some(match ttl {
                    Some(t) => std::cmp::min(t, rr.ttl),
                    None => rr.ttl,
                });
                records.push(rr.data.clone());
            }
        }

        ttl.map(|ttl| Rrset {
            name: name.clone(),
            rtype,
            rclass,
            ttl,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordData> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a Rrset {
    type Item = &'a RecordData;
    type IntoIter = std::slice::Iter<'a, RecordData>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// What sort of response this is.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    /// The queried name does not exist; meaningful from an authoritative
    /// server.  Better known as NXDOMAIN.
    NameError,
    NotImplemented,
    Refused,
    /// A name exists when it should not; better known as YXDOMAIN.
    YxDomain,
    Reserved(RcodeReserved),
}

/// A struct with a private constructor, to ensure invalid `Rcode`s cannot
/// be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RcodeReserved(u8);

impl From<u8> for Rcode {
    fn from(octet: u8) -> Self {
        match octet & 0b0000_1111 {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            6 => Rcode::YxDomain,
            other => Rcode::Reserved(RcodeReserved(other)),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::YxDomain => 6,
            Rcode::Reserved(RcodeReserved(octet)) => octet,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rcode::NoError => write!(f, "NOERROR"),
            Rcode::FormatError => write!(f, "FORMERR"),
            Rcode::ServerFailure => write!(f, "SERVFAIL"),
            Rcode::NameError => write!(f, "NXDOMAIN"),
            Rcode::NotImplemented => write!(f, "NOTIMP"),
            Rcode::Refused => write!(f, "REFUSED"),
            Rcode::YxDomain => write!(f, "YXDOMAIN"),
            Rcode::Reserved(RcodeReserved(octet)) => write!(f, "{octet}"),
        }
    }
}

/// Record types, plus the `ANY` metatype.
///
/// `ANY` never appears as the type of an `Rrset`: it exists as a query
/// type, and as the cache key under which negative responses shadow every
/// concrete type for a name.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    DNAME,
    ANY,
    Unknown(RecordTypeUnknown),
}

/// A struct with a private constructor, to ensure invalid `RecordType`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordTypeUnknown(u16);

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            39 => RecordType::DNAME,
            255 => RecordType::ANY,
            _ => RecordType::Unknown(RecordTypeUnknown(value)),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::DNAME => 39,
            RecordType::ANY => 255,
            RecordType::Unknown(RecordTypeUnknown(value)) => value,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::DNAME => write!(f, "DNAME"),
            RecordType::ANY => write!(f, "ANY"),
            RecordType::Unknown(RecordTypeUnknown(n)) => write!(f, "{n}"),
        }
    }
}

impl FromStr for RecordType {
    type Err = RecordTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "NS" => Ok(RecordType::NS),
            "CNAME" => Ok(RecordType::CNAME),
            "SOA" => Ok(RecordType::SOA),
            "PTR" => Ok(RecordType::PTR),
            "MX" => Ok(RecordType::MX),
            "TXT" => Ok(RecordType::TXT),
            "AAAA" => Ok(RecordType::AAAA),
            "DNAME" => Ok(RecordType::DNAME),
            "ANY" => Ok(RecordType::ANY),
            other => match other.parse::<u16>() {
                Ok(n) => Ok(RecordType::from(n)),
                Err(_) => Err(RecordTypeParseError),
            },
        }
    }
}

/// An error parsing a record type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTypeParseError;

impl fmt::Display for RecordTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not parse record type")
    }
}

impl std::error::Error for RecordTypeParseError {}

/// Record classes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordClass {
    IN,
    Unknown(RecordClassUnknown),
}

/// A struct with a private constructor, to ensure invalid `RecordClass`es
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordClassUnknown(u16);

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            _ => RecordClass::Unknown(RecordClassUnknown(value)),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::Unknown(RecordClassUnknown(value)) => value,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::Unknown(RecordClassUnknown(n)) => write!(f, "{n}"),
        }
    }
}

impl FromStr for RecordClass {
    type Err = RecordClassParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(RecordClass::IN),
            other => match other.parse::<u16>() {
                Ok(n) => Ok(RecordClass::from(n)),
                Err(_) => Err(RecordClassParseError),
            },
        }
    }
}

/// An error parsing a record class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordClassParseError;

impl fmt::Display for RecordClassParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not parse record class")
    }
}

impl std::error::Error for RecordClassParseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    #[test]
    fn u8_rcode_roundtrip() {
        for i in 0..15 {
            assert_eq!(u8::from(Rcode::from(i)), i);
        }
    }

    #[test]
    fn u16_recordtype_roundtrip() {
        for i in 0..300 {
            assert_eq!(u16::from(RecordType::from(i)), i);
        }
    }

    #[test]
    fn u16_recordclass_roundtrip() {
        for i in 0..100 {
            assert_eq!(u16::from(RecordClass::from(i)), i);
        }
    }

    #[test]
    fn recordtype_parses_mnemonics_and_numbers() {
        assert_eq!(Ok(RecordType::AAAA), "aaaa".parse());
        assert_eq!(Ok(RecordType::ANY), "ANY".parse());
        assert_eq!(Ok(RecordType::SOA), "6".parse());
        assert!("no-such-type".parse::<RecordType>().is_err());
    }

    #[test]
    fn make_query_sets_rd_and_question() {
        let request = Message::make_query(1234, question("www.example.com.", RecordType::A), None);

        assert!(request.flags.rd);
        assert!(!request.flags.qr);
        assert_eq!(1234, request.id);
        assert_eq!(name("www.example.com."), request.question().unwrap().name);
    }

    #[test]
    fn make_response_copies_id_and_question() {
        let request = Message::make_query(99, question("www.example.com.", RecordType::A), Some(0));
        let response = request.make_response();

        assert!(response.flags.qr);
        assert_eq!(request.id, response.id);
        assert_eq!(request.questions, response.questions);
    }

    #[test]
    fn rrset_find_takes_minimum_ttl() {
        let mut rr1 = a_record("www.example.com.", "1.1.1.1".parse().unwrap());
        let mut rr2 = a_record("www.example.com.", "2.2.2.2".parse().unwrap());
        rr1.ttl = 300;
        rr2.ttl = 30;
        let section = vec![
            rr1,
            rr2,
            cname_record("other.example.com.", "www.example.com."),
        ];

        let rrset = Rrset::find(
            &section,
            &name("www.example.com."),
            RecordType::A,
            RecordClass::IN,
        )
        .unwrap();

        assert_eq!(30, rrset.ttl);
        assert_eq!(2, rrset.len());
    }

    #[test]
    fn rrset_find_misses() {
        let section = vec![a_record("www.example.com.", "1.1.1.1".parse().unwrap())];

        assert_eq!(
            None,
            Rrset::find(
                &section,
                &name("www.example.com."),
                RecordType::AAAA,
                RecordClass::IN,
            )
        );
        assert_eq!(
            None,
            Rrset::find(
                &section,
                &name("web.example.com."),
                RecordType::A,
                RecordClass::IN,
            )
        );
    }
}
