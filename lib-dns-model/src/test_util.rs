//! Deterministic builders for tests, shared with downstream crates via the
//! `test-util` feature.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::message::{
    Flags, Message, Question, Rcode, RecordClass, RecordData, RecordType, ResourceRecord,
};
use crate::name::Name;

pub fn name(s: &str) -> Name {
    Name::from_dotted_string(s).unwrap()
}

pub fn question(s: &str, rtype: RecordType) -> Question {
    Question {
        name: name(s),
        rtype,
        rclass: RecordClass::IN,
    }
}

pub fn query(s: &str, rtype: RecordType) -> Message {
    Message::make_query(1234, question(s, rtype), None)
}

pub fn a_record(owner: &str, address: Ipv4Addr) -> ResourceRecord {
    ResourceRecord {
        name: name(owner),
        rclass: RecordClass::IN,
        ttl: 300,
        data: RecordData::A { address },
    }
}

pub fn aaaa_record(owner: &str, address: Ipv6Addr) -> ResourceRecord {
    ResourceRecord {
        name: name(owner),
        rclass: RecordClass::IN,
        ttl: 300,
        data: RecordData::AAAA { address },
    }
}

pub fn cname_record(owner: &str, target: &str) -> ResourceRecord {
    ResourceRecord {
        name: name(owner),
        rclass: RecordClass::IN,
        ttl: 300,
        data: RecordData::CNAME {
            cname: name(target),
        },
    }
}

pub fn dname_record(owner: &str, target: &str) -> ResourceRecord {
    ResourceRecord {
        name: name(owner),
        rclass: RecordClass::IN,
        ttl: 300,
        data: RecordData::DNAME {
            target: name(target),
        },
    }
}

pub fn ptr_record(owner: &str, target: &str) -> ResourceRecord {
    ResourceRecord {
        name: name(owner),
        rclass: RecordClass::IN,
        ttl: 300,
        data: RecordData::PTR {
            ptrdname: name(target),
        },
    }
}

pub fn soa_record(owner: &str, minimum: u32) -> ResourceRecord {
    ResourceRecord {
        name: name(owner),
        rclass: RecordClass::IN,
        ttl: 300,
        data: RecordData::SOA {
            mname: name("ns.example."),
            rname: name("hostmaster.example."),
            serial: 1,
            refresh: 2,
            retry: 3,
            expire: 4,
            minimum,
        },
    }
}

/// A NOERROR response to `request` carrying the given answer records.
pub fn answer_response(request: &Message, answers: Vec<ResourceRecord>) -> Message {
    let mut response = request.make_response();
    response.flags = Flags {
        aa: true,
        ..response.flags
    };
    response.answers = answers;
    response
}

/// A negative response to `request`: no answers, an SOA in the authority
/// section, and optionally the NXDOMAIN rcode.
pub fn negative_response(request: &Message, nxdomain: bool) -> Message {
    let mut response = request.make_response();
    response.flags = Flags {
        aa: true,
        ..response.flags
    };
    let owner = response.questions[0].name.to_dotted_string();
    response.authority = vec![soa_record(&owner, 300)];
    if nxdomain {
        response.rcode = Rcode::NameError;
    }
    response
}
