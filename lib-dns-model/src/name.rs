use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A domain name is a sequence of labels.  Labels are kept as lowercase
/// ASCII octets, since name comparisons are case-insensitive and this
/// library does not otherwise inspect them.  An absolute name ends with the
/// empty label of the root; a relative name does not.
///
/// A label must be 63 octets or shorter.  A name must be 255 octets or
/// shorter in total, including both length and label octets.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Name {
    pub labels: Vec<Vec<u8>>,
}

impl Name {
    pub fn root() -> Self {
        Name {
            labels: vec![Vec::new()],
        }
    }

    pub fn is_root(&self) -> bool {
        self.labels.len() == 1 && self.labels[0].is_empty()
    }

    /// An absolute name carries the trailing empty label of the root.
    pub fn is_absolute(&self) -> bool {
        match self.labels.last() {
            Some(label) => label.is_empty(),
            None => false,
        }
    }

    /// The number of dots the dotted-string form of this name has.  Used by
    /// the search-list rules, which compare it against `ndots`.
    pub fn num_dots(&self) -> usize {
        self.labels.len().saturating_sub(1)
    }

    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        self.labels.ends_with(&other.labels)
    }

    /// Append `suffix` to this name.  An already-absolute name is returned
    /// unchanged: there is nothing left to qualify.
    pub fn concat(&self, suffix: &Name) -> Name {
        if self.is_absolute() {
            return self.clone();
        }

        let mut labels = self.labels.clone();
        labels.extend(suffix.labels.iter().cloned());
        Name { labels }
    }

    /// This name, made absolute by appending the root if necessary.
    pub fn to_absolute(&self) -> Name {
        if self.is_absolute() {
            self.clone()
        } else {
            self.concat(&Name::root())
        }
    }

    /// The name with its leftmost label removed.  The root has no parent,
    /// and neither does a single-label relative name.
    pub fn parent(&self) -> Option<Name> {
        if self.labels.len() <= 1 {
            return None;
        }

        Some(Name {
            labels: self.labels[1..].to_vec(),
        })
    }

    /// Replace the `old` suffix of this name with `new`.  Returns `None` if
    /// `old` is not a suffix of the name.  This is how DNAME substitution
    /// rewrites an owner name.
    pub fn replace_suffix(&self, old: &Name, new: &Name) -> Option<Name> {
        if !self.is_subdomain_of(old) {
            return None;
        }

        let keep = self.labels.len() - old.labels.len();
        let mut labels = self.labels[..keep].to_vec();
        labels.extend(new.labels.iter().cloned());
        Some(Name { labels })
    }

    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }

        let mut out = String::new();
        let mut first = true;
        for label in &self.labels {
            if first {
                first = false;
            } else {
                out.push('.');
            }
            for octet in label {
                out.push(*octet as char);
            }
        }

        out
    }

    /// Parse a dotted-string name.  A trailing dot makes the name absolute;
    /// `"."` alone is the root.
    pub fn from_dotted_string(s: &str) -> Option<Self> {
        if s == "." {
            return Some(Self::root());
        }

        let chunks = s.split('.').collect::<Vec<_>>();
        let mut labels = Vec::with_capacity(chunks.len());

        for (i, label) in chunks.iter().enumerate() {
            if label.is_empty() && i != chunks.len() - 1 {
                return None;
            }

            labels.push(label.as_bytes().into());
        }

        Self::from_labels(labels)
    }

    /// Build a name from labels, normalizing to lowercase and checking the
    /// length limits.  An empty label is only permitted at the end, where it
    /// denotes the root.
    pub fn from_labels(mixed_case_labels: Vec<Vec<u8>>) -> Option<Self> {
        if mixed_case_labels.is_empty() {
            return None;
        }

        let mut labels = Vec::<Vec<u8>>::with_capacity(mixed_case_labels.len());
        let mut octets = 0;
        let mut blank_label = false;

        for mc_label in &mixed_case_labels {
            if blank_label {
                return None;
            }

            blank_label = mc_label.is_empty();

            match mc_label.len() {
                n if n <= 63 => {
                    octets += n + 1;
                    let mut label = Vec::<u8>::with_capacity(mc_label.len());
                    for octet in mc_label {
                        if !octet.is_ascii() {
                            return None;
                        }

                        label.push(octet.to_ascii_lowercase());
                    }
                    labels.push(label);
                }
                _ => return None,
            }
        }

        // length as it would be on the wire, once made absolute
        if !blank_label {
            octets += 1;
        }

        if octets <= 255 {
            Some(Self { labels })
        } else {
            None
        }
    }

    /// The absolute name a PTR query for `address` asks about, under
    /// `in-addr.arpa.` or `ip6.arpa.`.
    pub fn from_reverse_address(address: IpAddr) -> Name {
        let mut labels = Vec::new();
        match address {
            IpAddr::V4(v4) => {
                for octet in v4.octets().iter().rev() {
                    labels.push(octet.to_string().into_bytes());
                }
                labels.push(b"in-addr".to_vec());
            }
            IpAddr::V6(v6) => {
                const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";
                for octet in v6.octets().iter().rev() {
                    labels.push(vec![HEX_DIGITS[usize::from(octet & 0x0f)]]);
                    labels.push(vec![HEX_DIGITS[usize::from(octet >> 4)]]);
                }
                labels.push(b"ip6".to_vec());
            }
        }
        labels.push(b"arpa".to_vec());
        labels.push(Vec::new());
        Name { labels }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted_string())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Name")
            .field("to_dotted_string()", &self.to_dotted_string())
            .finish()
    }
}

impl FromStr for Name {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::from_dotted_string(s).ok_or(NameParseError)
    }
}

/// An error parsing a dotted-string domain name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameParseError;

impl fmt::Display for NameParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not parse domain name")
    }
}

impl std::error::Error for NameParseError {}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    #[test]
    fn root_conversions() {
        assert_eq!(Some(Name::root()), Name::from_dotted_string("."));
        assert_eq!(Some(Name::root()), Name::from_labels(vec![Vec::new()]));
        assert_eq!(".", Name::root().to_dotted_string());
        assert!(Name::root().is_absolute());
    }

    #[test]
    fn absolute_vs_relative() {
        let absolute = Name::from_dotted_string("www.example.com.").unwrap();
        let relative = Name::from_dotted_string("www.example.com").unwrap();

        assert!(absolute.is_absolute());
        assert!(!relative.is_absolute());
        assert_eq!("www.example.com.", absolute.to_dotted_string());
        assert_eq!("www.example.com", relative.to_dotted_string());
        assert_eq!(absolute, relative.to_absolute());
    }

    #[test]
    fn from_dotted_string_rejects_empty_inner_label() {
        assert_eq!(None, Name::from_dotted_string("www..example.com."));
    }

    #[test]
    fn from_labels_normalizes_case() {
        let name = Name::from_labels(vec![b"WWW".to_vec(), b"Example".to_vec(), Vec::new()]);
        assert_eq!("www.example.", name.unwrap().to_dotted_string());
    }

    #[test]
    fn from_labels_rejects_long_label() {
        let label = vec![b'x'; 64];
        assert_eq!(None, Name::from_labels(vec![label, Vec::new()]));
    }

    #[test]
    fn from_labels_rejects_long_name() {
        let labels = std::iter::repeat(vec![b'x'; 63])
            .take(5)
            .chain(std::iter::once(Vec::new()))
            .collect();
        assert_eq!(None, Name::from_labels(labels));
    }

    #[test]
    fn num_dots_matches_text_form() {
        assert_eq!(2, Name::from_dotted_string("www.example.com").unwrap().num_dots());
        assert_eq!(3, Name::from_dotted_string("www.example.com.").unwrap().num_dots());
        assert_eq!(0, Name::from_dotted_string("www").unwrap().num_dots());
    }

    #[test]
    fn concat_appends_suffix() {
        let www = Name::from_dotted_string("www").unwrap();
        let suffix = Name::from_dotted_string("example.com.").unwrap();
        assert_eq!("www.example.com.", www.concat(&suffix).to_dotted_string());
    }

    #[test]
    fn concat_leaves_absolute_name_alone() {
        let www = Name::from_dotted_string("www.example.com.").unwrap();
        let suffix = Name::from_dotted_string("example.net.").unwrap();
        assert_eq!(www, www.concat(&suffix));
    }

    #[test]
    fn parent_walks_towards_root() {
        let name = Name::from_dotted_string("www.example.com.").unwrap();
        let parent = name.parent().unwrap();
        assert_eq!("example.com.", parent.to_dotted_string());
        assert_eq!(None, Name::root().parent());
    }

    #[test]
    fn subdomain_check() {
        let sub = Name::from_dotted_string("www.example.com.").unwrap();
        let apex = Name::from_dotted_string("example.com.").unwrap();
        let other = Name::from_dotted_string("example.net.").unwrap();

        assert!(sub.is_subdomain_of(&apex));
        assert!(sub.is_subdomain_of(&sub));
        assert!(!sub.is_subdomain_of(&other));
        assert!(sub.is_subdomain_of(&Name::root()));
    }

    #[test]
    fn replace_suffix_substitutes() {
        let name = Name::from_dotted_string("host.dept.example.com.").unwrap();
        let old = Name::from_dotted_string("example.com.").unwrap();
        let new = Name::from_dotted_string("example.net.").unwrap();

        assert_eq!(
            "host.dept.example.net.",
            name.replace_suffix(&old, &new).unwrap().to_dotted_string()
        );
        assert_eq!(None, name.replace_suffix(&new, &old));
    }

    #[test]
    fn reverse_address_v4() {
        let name = Name::from_reverse_address(IpAddr::V4(Ipv4Addr::new(8, 8, 4, 4)));
        assert_eq!("4.4.8.8.in-addr.arpa.", name.to_dotted_string());
        assert!(name.is_absolute());
    }

    #[test]
    fn reverse_address_v6() {
        let name = Name::from_reverse_address(IpAddr::V6(Ipv6Addr::new(
            0x2001, 0x0db8, 0, 0, 0, 0, 0, 1,
        )));
        assert_eq!(
            "1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.8.b.d.0.1.0.0.2.ip6.arpa.",
            name.to_dotted_string()
        );
    }
}
