use crate::names::Hierarchy;
use crate::utils::errors::{DpkiError, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One relative distinguished name: attributes joined with `+`
pub type Rdn = Vec<(String, String)>;

/// Distinguished name kept as written: most specific RDN first.
///
/// Parsing is deliberately plain: `,` separates RDNs and `+` separates the
/// attributes of a multi-valued RDN. Escaped separators are not supported.
///
/// A multi-valued RDN is a set: DER stores its attributes sorted, so
/// equality ignores their order.
#[derive(Debug, Clone, Eq)]
pub struct DistinguishedName {
    rdns: Vec<Rdn>,
}

impl DistinguishedName {
    pub fn parse(src: &str) -> Result<Self> {
        if src.trim().is_empty() {
            return Err(DpkiError::InvalidName("empty name".to_string()));
        }

        let mut rdns = Vec::new();
        for item in src.split(',') {
            let mut rdn = Vec::new();
            for part in item.trim().split('+') {
                let (key, value) = part.trim().split_once('=').ok_or_else(|| {
                    DpkiError::InvalidName(format!("`{src}`: missing `=` in `{}`", part.trim()))
                })?;
                let key = key.trim().to_uppercase();
                if key.is_empty() {
                    return Err(DpkiError::InvalidName(format!(
                        "`{src}`: empty attribute type"
                    )));
                }
                rdn.push((key, value.trim().to_string()));
            }
            rdns.push(rdn);
        }

        Ok(Self { rdns })
    }

    /// Build from already split RDNs
    pub fn from_rdns(rdns: Vec<Rdn>) -> Result<Self> {
        if rdns.is_empty() || rdns.iter().any(|rdn| rdn.is_empty()) {
            return Err(DpkiError::InvalidName("empty RDN".to_string()));
        }
        Ok(Self { rdns })
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// All attributes in written order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rdns
            .iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn canonical(&self) -> Vec<Rdn> {
        self.rdns
            .iter()
            .map(|rdn| {
                let mut rdn = rdn.clone();
                rdn.sort();
                rdn
            })
            .collect()
    }

    /// First value of an attribute type
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Extract the part of the name that belongs to `hierarchy`.
    ///
    /// With `base` the entity's own leaf RDN is dropped, leaving the
    /// namespace the entity lives in. The result must end at the
    /// hierarchy's root, otherwise the name is not part of that hierarchy.
    pub fn extract(&self, hierarchy: Hierarchy, base: bool) -> Option<Self> {
        let filtered: Vec<Rdn> = self
            .rdns
            .iter()
            .map(|rdn| {
                rdn.iter()
                    .filter(|(k, _)| hierarchy.contains(k))
                    .cloned()
                    .collect::<Rdn>()
            })
            .collect();

        let mut slice = filtered.as_slice();
        if base {
            let starts_with_leaf = slice
                .first()
                .and_then(|rdn| rdn.first())
                .is_some_and(|(k, _)| k == hierarchy.leaf());
            if starts_with_leaf {
                slice = &slice[1..];
            }
        }

        let result: Vec<Rdn> = slice.iter().filter(|rdn| !rdn.is_empty()).cloned().collect();
        match result.last().and_then(|rdn| rdn.first()) {
            Some((k, _)) if k == hierarchy.root() => Some(Self { rdns: result }),
            _ => None,
        }
    }

    /// The full `hierarchy` part of the name, leaf included
    pub fn select(&self, hierarchy: Hierarchy) -> Option<Self> {
        self.extract(hierarchy, false)
    }

    /// How many levels below `self` the name `other` sits within `hierarchy`.
    ///
    /// 1 means `other` lives directly in the namespace of `self`; 0 means
    /// `other` is outside of it.
    pub fn distance(&self, hierarchy: Hierarchy, other: &DistinguishedName) -> u32 {
        let (Some(own), Some(theirs)) = (self.extract(hierarchy, true), other.extract(hierarchy, true))
        else {
            return 0;
        };
        if theirs.canonical().ends_with(&own.canonical()) {
            (theirs.len() - own.len() + 1) as u32
        } else {
            0
        }
    }

    /// A usable certificate name has several RDNs and belongs to at least one hierarchy
    pub fn validate(&self) -> Result<()> {
        if self.rdns.len() < 2 {
            return Err(DpkiError::InvalidName(format!(
                "`{self}` needs at least two RDNs"
            )));
        }
        if Hierarchy::ALL.iter().all(|h| self.select(*h).is_none()) {
            return Err(DpkiError::InvalidName(format!(
                "`{self}` does not belong to any naming hierarchy"
            )));
        }
        Ok(())
    }

    /// Dotted DNS domain built from the DC components
    pub fn domain(&self) -> Option<String> {
        let hierarchy = self.select(Hierarchy::Domain)?;
        let labels: Vec<&str> = hierarchy
            .rdns
            .iter()
            .filter_map(|rdn| rdn.first())
            .filter(|(k, _)| k == "DC")
            .map(|(_, v)| v.as_str())
            .collect();
        if labels.is_empty() {
            None
        } else {
            Some(labels.join("."))
        }
    }

    /// UID of the leaf RDN
    pub fn uid(&self) -> Option<&str> {
        self.rdns
            .first()?
            .iter()
            .find(|(k, _)| k == "UID")
            .map(|(_, v)| v.as_str())
    }
}

/// Largest distance between issuer and subject over all hierarchies
pub fn can_issue(issuer: &DistinguishedName, subject: &DistinguishedName) -> u32 {
    Hierarchy::ALL
        .iter()
        .map(|h| issuer.distance(*h, subject))
        .max()
        .unwrap_or(0)
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Hash for DistinguishedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl FromStr for DistinguishedName {
    type Err = DpkiError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .rdns
            .iter()
            .map(|rdn| {
                rdn.iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("+")
            })
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&rendered)
    }
}
