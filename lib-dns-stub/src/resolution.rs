use std::collections::HashMap;
use std::mem;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use rand::Rng;

use dns_model::message::{Message, Question, Rcode, RecordClass, RecordType};
use dns_model::name::Name;

use crate::answer::{Answer, CacheKey};
use crate::cache::AnswerCache;
use crate::config::Config;
use crate::errors::{AttemptCause, AttemptError, Nxdomain, ResolveError};
use crate::transport::TransportError;

/// Options for a single `resolve` call.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Use the stream transport from the first attempt.
    pub use_tcp: bool,
    /// Fail with `NoAnswer` when the name exists but has no record set of
    /// the requested type; when off, an answer with an absent rrset is
    /// returned instead.
    pub raise_on_no_answer: bool,
    /// Whether to expand relative names through the search list.  `None`
    /// defers to the configuration's `use_search_by_default`.
    pub search: Option<bool>,
    /// Bind outgoing sockets to this address.
    pub source: Option<IpAddr>,
    /// Bind outgoing sockets to this port.
    pub source_port: u16,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            use_tcp: false,
            raise_on_no_answer: true,
            search: None,
            source: None,
            source_port: 0,
        }
    }
}

/// What the outer loop should do next: send a freshly built query, or hand
/// a cached answer straight back.
#[derive(Debug)]
pub(crate) enum NextRequest {
    Query(Message),
    Answer(Answer),
}

/// The absolute names to try for a query name, in order.
///
/// Absolute input names are tried as given.  For relative names, the
/// search flag (falling back to `use_search_by_default`) picks between the
/// single `domain` fallback and the search list; a relative name with at
/// least `ndots` dots additionally gets tried as given, after the search
/// expansions.
pub(crate) fn plan_qnames(config: &Config, name: &Name, search: Option<bool>) -> Vec<Name> {
    if name.is_absolute() {
        return vec![name.clone()];
    }

    let search_enabled = search.unwrap_or(config.use_search_by_default);
    if !search_enabled {
        return vec![name.concat(&config.domain).to_absolute()];
    }

    let mut plan = Vec::with_capacity(config.search.len() + 1);
    if config.search.is_empty() {
        plan.push(name.concat(&config.domain).to_absolute());
    } else {
        for suffix in &config.search {
            plan.push(name.concat(suffix).to_absolute());
        }
    }
    if name.num_dots() >= config.ndots {
        plan.push(name.to_absolute());
    }
    plan
}

/// The live state of one `resolve` call: the names left to try, the
/// nameserver rotation, and the negative responses gathered so far.
///
/// Created at the start of a resolution, consumed until a terminal
/// outcome, then discarded.
pub(crate) struct Resolution<'a> {
    config: &'a Config,
    cache: Option<&'a dyn AnswerCache>,

    rtype: RecordType,
    rclass: RecordClass,
    use_tcp: bool,
    raise_on_no_answer: bool,

    /// Names not yet tried; consumed front to back.
    qnames_to_try: std::collections::VecDeque<Name>,
    /// Names already tried, in order.
    tried: Vec<Name>,
    /// The name currently being resolved.
    qname: Option<Name>,

    nameservers: Vec<IpAddr>,
    /// Index of the next server to hand out.
    next_server: usize,
    /// How many servers have been handed out in the current round.
    served_this_round: usize,
    /// How many times the rotation has wrapped.
    round: u32,
    /// The server the last query went to.
    nameserver: Option<(IpAddr, u16)>,

    /// The next attempt retries the same server over the stream transport.
    retry_with_tcp: bool,
    /// Whether the last issued query used the stream transport.
    tcp_attempt: bool,

    /// NXDOMAIN responses accumulated across query names.
    nxdomain_responses: HashMap<Name, Message>,
    /// Every failed exchange, kept as evidence for terminal errors.
    errors: Vec<AttemptError>,

    deadline: Instant,
}

impl<'a> Resolution<'a> {
    pub(crate) fn new(
        config: &'a Config,
        cache: Option<&'a dyn AnswerCache>,
        name: &Name,
        rtype: RecordType,
        rclass: RecordClass,
        options: &ResolveOptions,
    ) -> Result<Self, ResolveError> {
        let plan = plan_qnames(config, name, options.search);
        if plan.is_empty() {
            return Err(ResolveError::Nxdomain(Nxdomain::default()));
        }

        let nameservers = config.nameservers.clone();
        let next_server = if config.rotate && !nameservers.is_empty() {
            rand::thread_rng().gen_range(0..nameservers.len())
        } else {
            0
        };

        Ok(Resolution {
            config,
            cache,
            rtype,
            rclass,
            use_tcp: options.use_tcp,
            raise_on_no_answer: options.raise_on_no_answer,
            qnames_to_try: plan.into(),
            tried: Vec::new(),
            qname: None,
            nameservers,
            next_server,
            served_this_round: 0,
            round: 0,
            nameserver: None,
            retry_with_tcp: false,
            tcp_attempt: false,
            nxdomain_responses: HashMap::new(),
            errors: Vec::new(),
            deadline: Instant::now() + config.lifetime,
        })
    }

    /// Advance to the next query name.  Consults the cache first: an exact
    /// hit is handed back, and a negative `ANY` shadow either fails the
    /// name (NXDOMAIN, moving on to the next one) or surfaces the stored
    /// no-data answer.  A cache miss builds a fresh query message.
    ///
    /// When no names are left, fails with `Nxdomain` carrying every
    /// negative response gathered along the way.
    pub(crate) fn next_request(&mut self) -> Result<NextRequest, ResolveError> {
        while let Some(qname) = self.qnames_to_try.pop_front() {
            self.tried.push(qname.clone());
            self.qname = Some(qname.clone());

            if let Some(cache) = self.cache {
                let key = CacheKey::new(qname.clone(), self.rtype, self.rclass);
                if let Some(answer) = cache.get(&key) {
                    tracing::trace!(%qname, "cache hit");
                    if answer.rrset.is_none() && self.raise_on_no_answer {
                        return Err(ResolveError::NoAnswer {
                            response: Box::new(answer.response),
                        });
                    }
                    return Ok(NextRequest::Answer(answer));
                }

                let shadow_key = CacheKey::any_shadow(qname.clone(), self.rclass);
                if let Some(shadow) = cache.get(&shadow_key) {
                    if shadow.response.rcode == Rcode::NameError {
                        tracing::trace!(%qname, "cached NXDOMAIN");
                        self.nxdomain_responses.insert(qname, shadow.response);
                        continue;
                    }
                    tracing::trace!(%qname, "cached no-data");
                    if self.raise_on_no_answer {
                        return Err(ResolveError::NoAnswer {
                            response: Box::new(shadow.response),
                        });
                    }
                    return Ok(NextRequest::Answer(shadow));
                }
            }

            let question = Question {
                name: qname,
                rtype: self.rtype,
                rclass: self.rclass,
            };
            let request =
                Message::make_query(rand::thread_rng().gen(), question, self.config.edns);
            return Ok(NextRequest::Query(request));
        }

        Err(ResolveError::Nxdomain(Nxdomain::new(
            mem::take(&mut self.tried),
            mem::take(&mut self.nxdomain_responses),
        )))
    }

    /// Pick the endpoint for the next attempt.
    ///
    /// A pending TCP retry returns the same server again, over the stream
    /// transport, and clears the flag.  Otherwise servers rotate in order;
    /// the first pick of each round after the first carries the backoff
    /// the caller should sleep for, doubling every round from 100ms.
    pub(crate) fn next_nameserver(
        &mut self,
    ) -> Result<(IpAddr, u16, bool, Duration), ResolveError> {
        if self.retry_with_tcp {
            if let Some((nameserver, port)) = self.nameserver {
                self.retry_with_tcp = false;
                self.tcp_attempt = true;
                return Ok((nameserver, port, true, Duration::ZERO));
            }
            self.retry_with_tcp = false;
        }

        if self.nameservers.is_empty() {
            return Err(ResolveError::NoNameservers {
                errors: mem::take(&mut self.errors),
            });
        }

        if self.served_this_round >= self.nameservers.len() {
            self.round += 1;
            self.served_this_round = 0;
        }

        let backoff = if self.served_this_round == 0 && self.round > 0 {
            Duration::from_millis(100u64.saturating_mul(1 << (self.round - 1).min(32)))
        } else {
            Duration::ZERO
        };

        let index = self.next_server % self.nameservers.len();
        let nameserver = self.nameservers[index];
        self.next_server = (index + 1) % self.nameservers.len();
        self.served_this_round += 1;

        self.nameserver = Some((nameserver, self.config.port));
        self.tcp_attempt = self.use_tcp;
        Ok((nameserver, self.config.port, self.use_tcp, backoff))
    }

    /// Take a server out of the rotation for the rest of this resolution.
    pub(crate) fn remove_nameserver(&mut self, nameserver: IpAddr) {
        self.nameservers.retain(|ns| *ns != nameserver);
        if self.nameservers.is_empty() {
            self.next_server = 0;
        } else {
            self.next_server %= self.nameservers.len();
        }
    }

    /// Classify the outcome of one exchange into `(answer, done)`.
    ///
    /// `done` set without an answer means the current query name is
    /// settled (authoritatively nonexistent) and the outer loop should
    /// advance to the next one.  Neither set means: try another server.
    pub(crate) fn query_result(
        &mut self,
        result: Result<Message, TransportError>,
    ) -> Result<(Option<Answer>, bool), ResolveError> {
        let (nameserver, port) = match self.nameserver {
            Some(endpoint) => endpoint,
            None => return Ok((None, false)),
        };

        let response = match result {
            Err(TransportError::Timeout) => {
                // transient; same server list, next server
                tracing::debug!(%nameserver, "query timed out");
                self.record_error(nameserver, port, AttemptCause::Transport(TransportError::Timeout));
                return Ok((None, false));
            }
            Err(TransportError::Truncated) if !self.tcp_attempt => {
                tracing::debug!(%nameserver, "truncated over datagram, retrying with tcp");
                self.retry_with_tcp = true;
                return Ok((None, false));
            }
            Err(error) => {
                // this nameserver is no good, take it out of the mix
                tracing::debug!(%nameserver, %error, "removing nameserver");
                self.record_error(nameserver, port, AttemptCause::Transport(error));
                self.remove_nameserver(nameserver);
                return Ok((None, false));
            }
            Ok(response) => response,
        };

        let qname = match self.qname.clone() {
            Some(qname) => qname,
            None => return Ok((None, false)),
        };

        match response.rcode {
            Rcode::NoError => {
                let answer = match Answer::from_response(
                    &qname,
                    self.rtype,
                    self.rclass,
                    response,
                    self.raise_on_no_answer,
                ) {
                    Ok(answer) => answer,
                    Err(ResolveError::NoAnswer { response }) => {
                        // cache the answerless answer before failing, so the
                        // next asker is spared the round trip
                        if let Some(cache) = self.cache {
                            if let Ok(shadow) = Answer::from_response(
                                &qname,
                                RecordType::ANY,
                                self.rclass,
                                (*response).clone(),
                                false,
                            ) {
                                cache.put(CacheKey::any_shadow(qname, self.rclass), shadow);
                            }
                        }
                        return Err(ResolveError::NoAnswer { response });
                    }
                    Err(error) => return Err(error),
                };

                if let Some(cache) = self.cache {
                    let key = if answer.rrset.is_some() {
                        CacheKey::new(qname, self.rtype, self.rclass)
                    } else {
                        CacheKey::any_shadow(qname, self.rclass)
                    };
                    cache.put(key, answer.clone());
                }
                Ok((Some(answer), true))
            }
            Rcode::NameError => {
                tracing::debug!(%qname, "authoritative NXDOMAIN");
                if let Some(cache) = self.cache {
                    if let Ok(shadow) = Answer::from_response(
                        &qname,
                        RecordType::ANY,
                        self.rclass,
                        response.clone(),
                        false,
                    ) {
                        cache.put(CacheKey::any_shadow(qname.clone(), self.rclass), shadow);
                    }
                }
                self.nxdomain_responses.insert(qname, response);
                Ok((None, true))
            }
            Rcode::YxDomain => Err(ResolveError::YxDomain),
            rcode => {
                self.record_error(nameserver, port, AttemptCause::Rcode(rcode));
                if rcode == Rcode::ServerFailure && self.config.retry_servfail {
                    tracing::debug!(%nameserver, "SERVFAIL, retrying");
                } else {
                    tracing::debug!(%nameserver, %rcode, "removing nameserver");
                    self.remove_nameserver(nameserver);
                }
                Ok((None, false))
            }
        }
    }

    /// The deadline for the next attempt: the per-attempt timeout, clipped
    /// to whatever is left of the resolution lifetime.
    pub(crate) fn attempt_timeout(&mut self) -> Result<Duration, ResolveError> {
        let now = Instant::now();
        if now >= self.deadline {
            return Err(self.lifetime_exceeded());
        }
        Ok(std::cmp::min(self.config.timeout, self.deadline - now))
    }

    /// Check that a pause of `duration` still fits inside the lifetime.
    pub(crate) fn ensure_lifetime_for(&mut self, duration: Duration) -> Result<(), ResolveError> {
        if Instant::now() + duration >= self.deadline {
            return Err(self.lifetime_exceeded());
        }
        Ok(())
    }

    fn lifetime_exceeded(&mut self) -> ResolveError {
        ResolveError::LifetimeTimeout {
            lifetime: self.config.lifetime,
            errors: mem::take(&mut self.errors),
        }
    }

    fn record_error(&mut self, nameserver: IpAddr, port: u16, cause: AttemptCause) {
        self.errors.push(AttemptError {
            nameserver,
            port,
            tcp: self.tcp_attempt,
            cause,
        });
    }
}
