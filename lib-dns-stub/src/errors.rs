use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use dns_model::message::{Message, Rcode, RecordClass};
use dns_model::name::Name;

use crate::answer::follow_chain;
use crate::transport::TransportError;

/// An error that can occur when trying to resolve a question.
#[derive(Debug)]
pub enum ResolveError {
    /// Every query name was authoritatively reported as nonexistent.
    Nxdomain(Nxdomain),
    /// The name exists but has no record set of the requested type and
    /// class, and the caller asked for that to be an error.
    NoAnswer { response: Box<Message> },
    /// Every nameserver was removed from the rotation before an answer was
    /// obtained.
    NoNameservers { errors: Vec<AttemptError> },
    /// The nameserver reported the name exists when it should not (DNAME
    /// substitution made it too long).
    YxDomain,
    /// The rotation wrapped too many times without an answer.
    TooManyAttempts,
    /// The per-resolution deadline expired.
    LifetimeTimeout {
        lifetime: Duration,
        errors: Vec<AttemptError>,
    },
    /// An operation needing an absolute name was given a relative one.
    NotAbsolute { name: Name },
    /// The zone walk reached the root without finding an SOA.
    NoRootSoa,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Nxdomain(nxdomain) => write!(f, "{nxdomain}"),
            ResolveError::NoAnswer { .. } => {
                write!(f, "the DNS response does not contain an answer to the question")
            }
            ResolveError::NoNameservers { errors } => {
                write!(f, "all nameservers failed to answer the query")?;
                write_attempt_errors(f, errors)
            }
            ResolveError::YxDomain => {
                write!(f, "the DNS query name is too long after DNAME substitution")
            }
            ResolveError::TooManyAttempts => {
                write!(f, "the resolution had too many unsuccessful attempts")
            }
            ResolveError::LifetimeTimeout { lifetime, errors } => {
                write!(
                    f,
                    "the resolution lifetime expired after {:.3} seconds",
                    lifetime.as_secs_f64()
                )?;
                write_attempt_errors(f, errors)
            }
            ResolveError::NotAbsolute { name } => {
                write!(f, "the name '{name}' is not absolute")
            }
            ResolveError::NoRootSoa => write!(f, "there is no SOA RR at the DNS root"),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

fn write_attempt_errors(f: &mut fmt::Formatter<'_>, errors: &[AttemptError]) -> fmt::Result {
    if errors.is_empty() {
        return Ok(());
    }

    write!(f, ": ")?;
    for (i, error) in errors.iter().enumerate() {
        if i > 0 {
            write!(f, "; ")?;
        }
        write!(f, "{error}")?;
    }
    Ok(())
}

/// One failed exchange with one endpoint.  Terminal errors carry these so
/// the evidence of what went wrong where is not lost.
#[derive(Debug)]
pub struct AttemptError {
    pub nameserver: IpAddr,
    pub port: u16,
    pub tcp: bool,
    pub cause: AttemptCause,
}

/// Why an attempt failed: either the transport reported an error, or the
/// response carried an rcode the resolver was not happy with.
#[derive(Debug)]
pub enum AttemptCause {
    Transport(TransportError),
    Rcode(Rcode),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = if self.tcp { "TCP" } else { "UDP" };
        write!(f, "server {}:{} ({proto}): ", self.nameserver, self.port)?;
        match &self.cause {
            AttemptCause::Transport(error) => write!(f, "{error}"),
            AttemptCause::Rcode(rcode) => write!(f, "rcode {rcode}"),
        }
    }
}

/// The authoritative non-existence of one or more query names, with the
/// responses that proved it.
///
/// One resolution can produce several of these (one per expanded query
/// name); `merge` combines them into a single aggregate.
#[derive(Debug, Clone, Default)]
pub struct Nxdomain {
    /// The query names that do not exist, in the order they were tried.
    pub qnames: Vec<Name>,
    /// The nameserver response for each query name.
    pub responses: HashMap<Name, Message>,
}

impl Nxdomain {
    pub fn new(qnames: Vec<Name>, responses: HashMap<Name, Message>) -> Self {
        Nxdomain { qnames, responses }
    }

    /// The stored response for a query name, if any.
    pub fn response(&self, qname: &Name) -> Option<&Message> {
        self.responses.get(qname)
    }

    /// Combine with a later aggregate: query names are unioned preserving
    /// order (first occurrence wins), responses are overlaid with the later
    /// ones taking precedence.
    pub fn merge(self, newer: Nxdomain) -> Nxdomain {
        let mut qnames = self.qnames;
        for qname in newer.qnames {
            if !qnames.contains(&qname) {
                qnames.push(qname);
            }
        }

        let mut responses = self.responses;
        responses.extend(newer.responses);

        Nxdomain { qnames, responses }
    }

    /// The unresolved canonical name: walk the query names in order and
    /// return the end of the first CNAME/DNAME chain that goes anywhere,
    /// falling back to the first query name.  `None` if the aggregate holds
    /// no query names at all.
    pub fn canonical_name(&self) -> Option<Name> {
        for qname in &self.qnames {
            if let Some(response) = self.responses.get(qname) {
                let rclass = response
                    .question()
                    .map_or(RecordClass::IN, |question| question.rclass);
                let (terminal, _) = follow_chain(&response.answers, qname, rclass);
                if terminal != *qname {
                    return Some(terminal);
                }
            }
        }

        self.qnames.first().cloned()
    }
}

impl fmt::Display for Nxdomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.qnames.as_slice() {
            [] => write!(f, "the DNS query name does not exist"),
            [qname] => write!(f, "the DNS query name does not exist: {qname}"),
            qnames => {
                write!(f, "none of the DNS query names exist: ")?;
                for (i, qname) in qnames.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{qname}")?;
                }
                Ok(())
            }
        }
    }
}
