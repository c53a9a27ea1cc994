#![warn(clippy::pedantic)]
// Sometimes a redundant else is clearer
#![allow(clippy::redundant_else)]
// Don't care enough to fix
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::similar_names)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::too_many_lines)]

pub mod answer;
pub mod cache;
pub mod config;
pub mod errors;
pub mod net;
pub mod transport;

mod resolution;

use std::io;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use tracing::Instrument;

use dns_model::message::{RecordClass, RecordType};
use dns_model::name::Name;

use crate::answer::Answer;
use crate::cache::AnswerCache;
use crate::config::Config;
use crate::errors::ResolveError;
use crate::resolution::{NextRequest, Resolution};
use crate::transport::Transport;

pub use crate::resolution::ResolveOptions;

/// How many times the nameserver rotation may wrap before a resolution is
/// abandoned as `TooManyAttempts`.
pub const MAX_ROTATION_ROUNDS: u32 = 5;

const LOCK_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] default resolver lock poisoned, cannot recover from this - aborting";

/// A DNS stub resolver: asks the recursive nameservers from its
/// configuration until it has an authoritative answer, an authoritative
/// non-existence proof, or a final failure.
///
/// The resolver itself holds no sockets; every exchange goes through the
/// `Transport` it was built with.  Concurrent `resolve` calls share only
/// the configuration and the cache.
pub struct Resolver {
    pub config: Config,
    pub cache: Option<Arc<dyn AnswerCache>>,
    pub transport: Arc<dyn Transport>,
}

impl Resolver {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        Resolver {
            config,
            cache: None,
            transport,
        }
    }

    /// Attach an answer cache.
    pub fn with_cache(mut self, cache: Arc<dyn AnswerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build a resolver from the system configuration (`/etc/resolv.conf`).
    pub async fn from_system_config(transport: Arc<dyn Transport>) -> io::Result<Self> {
        match Config::from_system().await? {
            Ok(config) => Ok(Resolver::new(config, transport)),
            Err(error) => Err(io::Error::new(io::ErrorKind::InvalidData, error.to_string())),
        }
    }

    /// Query nameservers to find the answer to the question.
    ///
    /// Relative names are expanded per the configuration's search rules;
    /// each candidate name is resolved against the rotation of configured
    /// nameservers, escalating from the datagram to the stream transport on
    /// truncation.  The whole call is bounded by the configured `lifetime`.
    ///
    /// # Errors
    ///
    /// See `ResolveError`.
    pub async fn resolve(
        &self,
        qname: &Name,
        rtype: RecordType,
        rclass: RecordClass,
        options: &ResolveOptions,
    ) -> Result<Answer, ResolveError> {
        self.run_resolution(qname, rtype, rclass, options)
            .instrument(tracing::error_span!("resolve", %qname, %rtype, %rclass))
            .await
    }

    async fn run_resolution(
        &self,
        qname: &Name,
        rtype: RecordType,
        rclass: RecordClass,
        options: &ResolveOptions,
    ) -> Result<Answer, ResolveError> {
        let mut resolution = Resolution::new(
            &self.config,
            self.cache.as_deref(),
            qname,
            rtype,
            rclass,
            options,
        )?;

        loop {
            let request = match resolution.next_request()? {
                NextRequest::Answer(answer) => {
                    tracing::trace!("answered from cache");
                    return Ok(answer);
                }
                NextRequest::Query(request) => request,
            };

            let mut rounds = 1;
            loop {
                let (nameserver, port, tcp, backoff) = resolution.next_nameserver()?;
                if !backoff.is_zero() {
                    rounds += 1;
                    if rounds >= MAX_ROTATION_ROUNDS {
                        return Err(ResolveError::TooManyAttempts);
                    }
                    resolution.ensure_lifetime_for(backoff)?;
                    tokio::time::sleep(backoff).await;
                }

                let attempt_timeout = resolution.attempt_timeout()?;
                let result = if tcp {
                    self.transport
                        .stream_query(
                            &request,
                            nameserver,
                            port,
                            options.source,
                            options.source_port,
                            attempt_timeout,
                        )
                        .instrument(tracing::error_span!("stream_query", %nameserver))
                        .await
                } else {
                    self.transport
                        .datagram_query(
                            &request,
                            nameserver,
                            port,
                            options.source,
                            options.source_port,
                            attempt_timeout,
                            true,
                        )
                        .instrument(tracing::error_span!("datagram_query", %nameserver))
                        .await
                };

                let (answer, done) = resolution.query_result(result)?;
                if let Some(answer) = answer {
                    return Ok(answer);
                }
                if done {
                    break;
                }
            }
        }
    }

    /// Run a reverse query for the PTR records of an address.
    pub async fn resolve_address(
        &self,
        address: IpAddr,
        options: &ResolveOptions,
    ) -> Result<Answer, ResolveError> {
        let qname = Name::from_reverse_address(address);
        self.resolve(&qname, RecordType::PTR, RecordClass::IN, options)
            .await
    }

    /// Find the name of the zone containing `qname`: walk towards the root
    /// asking for SOA records until an answer's owner matches the name
    /// asked about.
    ///
    /// # Errors
    ///
    /// `NotAbsolute` for a relative input; `NoRootSoa` if even the root
    /// has no SOA (only likely with badly misconfigured servers); any
    /// terminal resolution error other than NXDOMAIN/NoAnswer is passed
    /// through.
    pub async fn zone_for_name(
        &self,
        qname: &Name,
        rclass: RecordClass,
        use_tcp: bool,
    ) -> Result<Name, ResolveError> {
        if !qname.is_absolute() {
            return Err(ResolveError::NotAbsolute {
                name: qname.clone(),
            });
        }

        let options = ResolveOptions {
            use_tcp,
            ..ResolveOptions::default()
        };
        let mut candidate = qname.clone();
        loop {
            match self
                .resolve(&candidate, RecordType::SOA, rclass, &options)
                .await
            {
                Ok(answer) => {
                    if let Some(rrset) = &answer.rrset {
                        if rrset.name == candidate {
                            return Ok(candidate);
                        }
                    }
                    // CNAMEd or DNAMEd; need to look higher
                }
                Err(ResolveError::Nxdomain(_) | ResolveError::NoAnswer { .. }) => (),
                Err(error) => return Err(error),
            }

            candidate = match candidate.parent() {
                Some(parent) => parent,
                None => return Err(ResolveError::NoRootSoa),
            };
        }
    }
}

static DEFAULT_RESOLVER: RwLock<Option<Arc<Resolver>>> = RwLock::new(None);

/// Install `resolver` as the process-wide default if none is installed
/// yet, and return whichever resolver ends up being the default.
/// Installation happens at most once; later calls return the existing
/// instance.
pub fn init_default_resolver(resolver: Resolver) -> Arc<Resolver> {
    let mut guard = DEFAULT_RESOLVER.write().expect(LOCK_POISON_MESSAGE);
    match &*guard {
        Some(existing) => existing.clone(),
        None => {
            let resolver = Arc::new(resolver);
            *guard = Some(resolver.clone());
            resolver
        }
    }
}

/// Replace the process-wide default resolver.  Calls that are already
/// resolving keep the resolver they started with; new calls see the
/// replacement.
pub fn reset_default_resolver(resolver: Resolver) -> Arc<Resolver> {
    let resolver = Arc::new(resolver);
    *DEFAULT_RESOLVER.write().expect(LOCK_POISON_MESSAGE) = Some(resolver.clone());
    resolver
}

/// The process-wide default resolver.
///
/// # Panics
///
/// If no default has been installed with `init_default_resolver` or
/// `reset_default_resolver`.
pub fn default_resolver() -> Arc<Resolver> {
    DEFAULT_RESOLVER
        .read()
        .expect(LOCK_POISON_MESSAGE)
        .clone()
        .expect("no default resolver installed; call init_default_resolver first")
}

/// Query nameservers using the default resolver.  See
/// `Resolver::resolve`.
pub async fn resolve(
    qname: &Name,
    rtype: RecordType,
    options: &ResolveOptions,
) -> Result<Answer, ResolveError> {
    default_resolver()
        .resolve(qname, rtype, RecordClass::IN, options)
        .await
}

/// Run a reverse query using the default resolver.  See
/// `Resolver::resolve_address`.
pub async fn resolve_address(
    address: IpAddr,
    options: &ResolveOptions,
) -> Result<Answer, ResolveError> {
    default_resolver().resolve_address(address, options).await
}

/// Find the zone containing a name using the default resolver.  See
/// `Resolver::zone_for_name`.
pub async fn zone_for_name(qname: &Name) -> Result<Name, ResolveError> {
    default_resolver()
        .zone_for_name(qname, RecordClass::IN, false)
        .await
}
