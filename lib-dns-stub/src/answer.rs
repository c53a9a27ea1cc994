use std::time::{Duration, Instant};

use dns_model::message::{Message, RecordClass, RecordData, RecordType, ResourceRecord, Rrset};
use dns_model::name::Name;

use crate::errors::ResolveError;

/// How many CNAME/DNAME links a chain may have before we stop following
/// it.  A hostile server could otherwise keep us walking forever.
pub(crate) const MAX_CHAIN_HOPS: usize = 16;

/// The key an answer is cached under.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CacheKey {
    pub name: Name,
    pub rtype: RecordType,
    pub rclass: RecordClass,
}

impl CacheKey {
    pub fn new(name: Name, rtype: RecordType, rclass: RecordClass) -> Self {
        CacheKey {
            name,
            rtype,
            rclass,
        }
    }

    /// The key negative responses are stored under: `ANY` shadows every
    /// concrete record type for the name.
    pub fn any_shadow(name: Name, rclass: RecordClass) -> Self {
        CacheKey {
            name,
            rtype: RecordType::ANY,
            rclass,
        }
    }
}

/// A resolved response, with the record set that answers the question and
/// the time at which the whole thing stops being usable.
#[derive(Debug, Clone)]
pub struct Answer {
    /// The (absolute) name that was asked about.
    pub qname: Name,
    pub rtype: RecordType,
    pub rclass: RecordClass,
    /// The terminal name after following CNAME/DNAME chains in the
    /// response.
    pub canonical_name: Name,
    /// The record set satisfying `(canonical_name, rtype, rclass)`, absent
    /// for negative responses built with `raise_on_no_answer` off.
    pub rrset: Option<Rrset>,
    /// When this answer expires: the minimum TTL seen along the chain and
    /// in the record set, or for negative answers the SOA minimum.
    pub expiration: Instant,
    /// The full response message this answer was built from.
    pub response: Message,
}

impl Answer {
    /// Build an answer out of a response message.
    ///
    /// Follows the CNAME/DNAME chain in the answer section starting at
    /// `qname` and looks for the record set matching the requested type and
    /// class at the terminal name.  If there is none and
    /// `raise_on_no_answer` is set, this fails with
    /// `ResolveError::NoAnswer` carrying the response back.
    pub fn from_response(
        qname: &Name,
        rtype: RecordType,
        rclass: RecordClass,
        response: Message,
        raise_on_no_answer: bool,
    ) -> Result<Answer, ResolveError> {
        let mut owner = qname.to_absolute();
        let mut min_ttl: Option<u32> = None;
        let mut rrset = None;

        for _ in 0..MAX_CHAIN_HOPS {
            if let Some(found) = Rrset::find(&response.answers, &owner, rtype, rclass) {
                min_ttl = merge_min(min_ttl, found.ttl);
                rrset = Some(found);
                break;
            }

            if rtype == RecordType::CNAME {
                break;
            }

            if let Some(links) = Rrset::find(&response.answers, &owner, RecordType::CNAME, rclass)
            {
                if let Some(RecordData::CNAME { cname }) = links.records.first() {
                    min_ttl = merge_min(min_ttl, links.ttl);
                    owner = cname.clone();
                    continue;
                }
            }

            if let Some((ttl, next)) = dname_step(&response.answers, &owner, rclass) {
                min_ttl = merge_min(min_ttl, ttl);
                owner = next;
                continue;
            }

            break;
        }

        if rrset.is_none() && raise_on_no_answer {
            return Err(ResolveError::NoAnswer {
                response: Box::new(response),
            });
        }

        let ttl = if rrset.is_some() {
            min_ttl.unwrap_or(0)
        } else {
            negative_ttl(&response.authority, &owner, rclass, min_ttl)
        };

        Ok(Answer {
            qname: qname.to_absolute(),
            rtype,
            rclass,
            canonical_name: owner,
            rrset,
            expiration: Instant::now() + Duration::from_secs(u64::from(ttl)),
            response,
        })
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expiration
    }

    /// The records of the rrset; empty when the rrset is absent.
    pub fn records(&self) -> &[RecordData] {
        self.rrset.as_ref().map_or(&[], |rrset| &rrset.records[..])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordData> {
        self.records().iter()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Index access; `None` past the end, and always `None` when the rrset
    /// is absent.
    pub fn get(&self, index: usize) -> Option<&RecordData> {
        self.records().get(index)
    }
}

impl<'a> IntoIterator for &'a Answer {
    type Item = &'a RecordData;
    type IntoIter = std::slice::Iter<'a, RecordData>;

    fn into_iter(self) -> Self::IntoIter {
        self.records().iter()
    }
}

fn merge_min(min_ttl: Option<u32>, ttl: u32) -> Option<u32> {
    Some(match min_ttl {
        Some(t) => std::cmp::min(t, ttl),
        None => ttl,
    })
}

/// Follow one DNAME link: a DNAME whose owner is a proper ancestor of
/// `owner` rewrites that suffix.
fn dname_step(
    section: &[ResourceRecord],
    owner: &Name,
    rclass: RecordClass,
) -> Option<(u32, Name)> {
    for rr in section {
        if rr.rclass != rclass {
            continue;
        }
        if let RecordData::DNAME { target } = &rr.data {
            if owner.is_subdomain_of(&rr.name) && *owner != rr.name {
                if let Some(next) = owner.replace_suffix(&rr.name, target) {
                    return Some((rr.ttl, next));
                }
            }
        }
    }
    None
}

/// The time-to-live of a negative answer: the SOA `minimum` (and the SOA
/// record's own TTL) of the closest enclosing SOA in the authority
/// section, or zero if there is none.
fn negative_ttl(
    authority: &[ResourceRecord],
    canonical_name: &Name,
    rclass: RecordClass,
    min_ttl: Option<u32>,
) -> u32 {
    let mut owner = canonical_name.clone();
    loop {
        if let Some(soas) = Rrset::find(authority, &owner, RecordType::SOA, rclass) {
            let mut ttl = std::cmp::min(min_ttl.unwrap_or(u32::MAX), soas.ttl);
            if let Some(RecordData::SOA { minimum, .. }) = soas.records.first() {
                ttl = std::cmp::min(ttl, *minimum);
            }
            return ttl;
        }

        match owner.parent() {
            Some(parent) => owner = parent,
            None => return 0,
        }
    }
}

/// The terminal name of the CNAME/DNAME chain rooted at `qname` in a
/// message section, and the number of links followed.
pub(crate) fn follow_chain(
    section: &[ResourceRecord],
    qname: &Name,
    rclass: RecordClass,
) -> (Name, usize) {
    let mut owner = qname.clone();
    let mut hops = 0;

    while hops < MAX_CHAIN_HOPS {
        if let Some(links) = Rrset::find(section, &owner, RecordType::CNAME, rclass) {
            if let Some(RecordData::CNAME { cname }) = links.records.first() {
                owner = cname.clone();
                hops += 1;
                continue;
            }
        }

        if let Some((_, next)) = dname_step(section, &owner, rclass) {
            owner = next;
            hops += 1;
            continue;
        }

        break;
    }

    (owner, hops)
}

#[cfg(test)]
mod tests {
    use dns_model::test_util::*;

    use super::*;

    #[test]
    fn positive_answer_selects_rrset() {
        let request = query("www.example.com.", RecordType::A);
        let response = answer_response(
            &request,
            vec![a_record("www.example.com.", "10.0.0.1".parse().unwrap())],
        );

        let answer = Answer::from_response(
            &name("www.example.com."),
            RecordType::A,
            RecordClass::IN,
            response,
            true,
        )
        .unwrap();

        assert_eq!(name("www.example.com."), answer.canonical_name);
        assert_eq!(1, answer.len());
        assert!(answer.expiration > Instant::now() + Duration::from_secs(250));
    }

    #[test]
    fn cname_chain_is_followed_to_canonical_name() {
        let request = query("www.example.com.", RecordType::A);
        let mut web = a_record("web.example.com.", "10.0.0.1".parse().unwrap());
        web.ttl = 30;
        let response = answer_response(
            &request,
            vec![cname_record("www.example.com.", "web.example.com."), web],
        );

        let answer = Answer::from_response(
            &name("www.example.com."),
            RecordType::A,
            RecordClass::IN,
            response,
            true,
        )
        .unwrap();

        assert_eq!(name("web.example.com."), answer.canonical_name);
        assert_eq!(name("www.example.com."), answer.qname);
        // the 30s A record bounds the expiration, not the 300s CNAME
        assert!(answer.expiration <= Instant::now() + Duration::from_secs(30));
    }

    #[test]
    fn dname_rewrites_the_owner() {
        let request = query("host.old.example.", RecordType::A);
        let response = answer_response(
            &request,
            vec![
                dname_record("old.example.", "new.example."),
                a_record("host.new.example.", "10.0.0.1".parse().unwrap()),
            ],
        );

        let answer = Answer::from_response(
            &name("host.old.example."),
            RecordType::A,
            RecordClass::IN,
            response,
            true,
        )
        .unwrap();

        assert_eq!(name("host.new.example."), answer.canonical_name);
        assert_eq!(1, answer.len());
    }

    #[test]
    fn no_answer_is_an_error_when_asked_for() {
        let request = query("www.example.com.", RecordType::MX);
        let response = negative_response(&request, false);

        let result = Answer::from_response(
            &name("www.example.com."),
            RecordType::MX,
            RecordClass::IN,
            response,
            true,
        );

        assert!(matches!(result, Err(ResolveError::NoAnswer { .. })));
    }

    #[test]
    fn tolerated_empty_answer_yields_nothing() {
        let request = query("www.example.com.", RecordType::MX);
        let response = negative_response(&request, false);

        let answer = Answer::from_response(
            &name("www.example.com."),
            RecordType::MX,
            RecordClass::IN,
            response,
            false,
        )
        .unwrap();

        assert!(answer.rrset.is_none());
        assert!(answer.is_empty());
        assert_eq!(0, answer.iter().count());
        assert_eq!(None, answer.get(0));
        // negative TTL comes from the SOA minimum, so it is cacheable
        assert!(answer.expiration > Instant::now() + Duration::from_secs(250));
    }

    #[test]
    fn negative_ttl_uses_soa_minimum_when_smaller() {
        let request = query("www.example.com.", RecordType::MX);
        let mut response = negative_response(&request, false);
        response.authority = vec![soa_record("www.example.com.", 60)];

        let answer = Answer::from_response(
            &name("www.example.com."),
            RecordType::MX,
            RecordClass::IN,
            response,
            false,
        )
        .unwrap();

        assert!(answer.expiration <= Instant::now() + Duration::from_secs(60));
    }

    #[test]
    fn negative_ttl_finds_soa_at_an_ancestor() {
        let request = query("www.example.com.", RecordType::MX);
        let mut response = negative_response(&request, false);
        response.authority = vec![soa_record("example.com.", 300)];

        let answer = Answer::from_response(
            &name("www.example.com."),
            RecordType::MX,
            RecordClass::IN,
            response,
            false,
        )
        .unwrap();

        assert!(answer.expiration > Instant::now() + Duration::from_secs(250));
    }

    #[test]
    fn negative_without_soa_expires_immediately() {
        let request = query("www.example.com.", RecordType::MX);
        let mut response = negative_response(&request, false);
        response.authority = Vec::new();

        let answer = Answer::from_response(
            &name("www.example.com."),
            RecordType::MX,
            RecordClass::IN,
            response,
            false,
        )
        .unwrap();

        assert!(answer.is_expired(Instant::now()));
    }

    #[test]
    fn follow_chain_stops_at_dead_end() {
        let section = vec![
            cname_record("a.example.", "b.example."),
            cname_record("b.example.", "c.example."),
        ];

        let (terminal, hops) = follow_chain(&section, &name("a.example."), RecordClass::IN);
        assert_eq!(name("c.example."), terminal);
        assert_eq!(2, hops);

        let (terminal, hops) = follow_chain(&section, &name("x.example."), RecordClass::IN);
        assert_eq!(name("x.example."), terminal);
        assert_eq!(0, hops);
    }

    #[test]
    fn follow_chain_gives_up_on_loops() {
        let section = vec![
            cname_record("a.example.", "b.example."),
            cname_record("b.example.", "a.example."),
        ];

        let (_, hops) = follow_chain(&section, &name("a.example."), RecordClass::IN);
        assert_eq!(MAX_CHAIN_HOPS, hops);
    }
}
